//! One search-and-capture attempt
//!
//! Opens a page, searches the entity on the site, stamps the watermark,
//! captures the page and stores the PNG. The page is closed before the
//! result is inspected, on success and failure alike.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::{Path, PathBuf};

use super::crawl_types::{TaskError, TaskRecord};
use crate::automation::{AutomationDriver, DriverError, SessionPool, Watermark};
use crate::config::CaptureConfig;
use crate::content_saver::save_screenshot;

pub async fn search_and_capture<D: AutomationDriver>(
    pool: &SessionPool<D>,
    config: &CaptureConfig,
    run_root: &Path,
    queried_at: DateTime<Utc>,
    task: &TaskRecord,
) -> Result<PathBuf, TaskError> {
    let guard = pool.open_page().await?;
    let captured = drive_search(pool.driver().as_ref(), guard.page(), config, queried_at, task).await;
    guard.close().await;

    let png = captured?;
    let path = save_screenshot(run_root, &task.entity, &task.site.name, png, Utc::now()).await?;
    Ok(path)
}

async fn drive_search<D: AutomationDriver>(
    driver: &D,
    page: &D::Page,
    config: &CaptureConfig,
    queried_at: DateTime<Utc>,
    task: &TaskRecord,
) -> Result<Vec<u8>, DriverError> {
    let site = task.site.as_ref();

    debug!("[{}] navigating to {}", task.id, site.home_url);
    driver.navigate(page, &site.home_url).await?;

    let field_wait = if site.needs_captcha {
        info!(
            "[{}] {} may show a challenge, waiting up to {}s for the search field",
            task.id,
            site.name,
            config.challenge_timeout().as_secs()
        );
        config.challenge_timeout()
    } else {
        config.element_timeout()
    };
    driver
        .wait_for_element(page, &site.search_input_selector, field_wait)
        .await?;

    driver
        .type_into_field(page, &site.search_input_selector, &task.entity)
        .await?;

    driver
        .click_and_await_results(
            page,
            &site.search_button_selector,
            &site.results_selector,
            site.needs_navigation,
        )
        .await?;

    let watermark = Watermark {
        site: site.name.clone(),
        entity: task.entity.clone(),
        queried_at,
    };
    driver.annotate(page, &watermark).await?;

    debug!("[{}] capturing", task.id);
    driver.capture_full_page(page).await
}
