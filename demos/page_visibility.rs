//! # Example: page_visibility
//!
//! A page with a tab widget and a popup layer.
//!
//! Demonstrates how to:
//! - Build the [`Services`] bag and register page areas and widgets.
//! - Drive area visibility from a widget with [`VisibilityCoordinator::update_area_visibility`].
//! - Show a layer living in a hidden area with `update_widget_visibility`.
//! - Observe changes with listeners and a tracked property.
//!
//! ## Flow
//! ```text
//! tabs.update_area_visibility({first: true, second: false})
//!     └─► manager forwards with container = hidden ─► tabs answers: both hidden
//! manager.set_page_visibility(true)
//!     ├─► content visible ─► tabs asked again ─► tabs.first visible
//!     └─► article (inside tabs.first) is told "shown"
//! layer.update_widget_visibility(true)
//!     └─► popups stays hidden, layer.body becomes visible
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=widgetry=debug cargo run --example page_visibility
//! ```

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use widgetry::visibility::AreaUpdateOptions;
use widgetry::{Config, ServicesBuilder};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Configuration: short gathering timeout for the demo
    let cfg = Config::from_json(r#"{ "eventBusTimeoutMs": 500 }"#)?;

    // 2. Services bag with two page areas
    let services = ServicesBuilder::new(cfg)
        .with_page_areas(["content", "popups"])
        .build();
    let manager = services.visibility_manager();
    manager.register_widget("tabs", "content", ["first", "second"]);
    manager.register_widget("article", "tabs.first", Vec::<String>::new());
    manager.register_widget("layer", "popups", ["body"]);

    // 3. Widgets
    let tabs_ctx = services.widget_context("tabs", "content");
    let tabs = services.visibility(&tabs_ctx);

    let article_ctx = services.widget_context("article", "tabs.first");
    let article = services.visibility(&article_ctx);
    article
        .on_show(Arc::new(|_| println!("[article] shown")))
        .on_hide(Arc::new(|_| println!("[article] hidden")))
        .track_visibility();

    let layer_ctx = services.widget_context("layer", "popups");
    let layer = services.visibility(&layer_ctx);

    // 4. The tab widget selects its first tab
    tabs.update_area_visibility([("first", true), ("second", false)], AreaUpdateOptions::default())
        .await;

    // 5. The page becomes visible
    manager.set_page_visibility(true).await;
    services.global_event_bus().flush().await;
    println!(
        "[page] article isVisible = {}",
        article_ctx.property("isVisible").unwrap_or_default()
    );

    // 6. Open the popup layer
    layer.update_widget_visibility(true).await;
    services.global_event_bus().flush().await;
    let areas = services.area_helper("layer");
    println!(
        "[page] popups visible = {}, layer.body visible = {}",
        areas.is_visible("popups"),
        areas.is_visible("layer.body")
    );

    // 7. Switch tabs
    tabs.update_area_visibility([("first", false), ("second", true)], AreaUpdateOptions::default())
        .await;
    services.global_event_bus().flush().await;

    for coordinator in [&tabs, &article, &layer] {
        coordinator.release();
    }
    services.dispose();
    Ok(())
}
