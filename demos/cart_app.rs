//! Boots the cart application, walks through a few navigations, loads the
//! cart from a simulated backend and travels back in time.

use cartfold::{App, AppConfig, History, fetch_cart_entries};
use serde_json::json;
use simplelog::{ConfigBuilder, LevelFilter, SimpleLogger};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let _ = SimpleLogger::init(LevelFilter::Debug, log_config);

    let app = App::bootstrap(AppConfig {
        log_state: false,
        ..AppConfig::default()
    })?;
    println!("mounted at #{}", App::MOUNT_POINT);

    let view = app.navigate("/cart")?.await?;
    println!("{} -> {} ({})", app.history().location().path(), view.name, view.chunk);

    let fetch = fetch_cart_entries(|| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(json!({"sku1": {"qty": 2}, "sku2": {"qty": 1}}))
    });
    if let Some(pending) = app.store().dispatch(fetch)?.into_pending() {
        pending.join().await?;
    }
    println!("cart entries: {:?}", app.cart()?.entries.keys().collect::<Vec<_>>());

    let view = app.navigate("/sku1")?.await?;
    println!("{} -> {} ({})", app.history().location().path(), view.name, view.chunk);

    // Back to the state right after the first navigation.
    app.store().jump_to(2)?;
    println!(
        "after time travel: engine at {}, {} cart entries",
        app.history().location().path(),
        app.cart()?.entries.len()
    );

    Ok(())
}
