//! Step the bias through a range and read the current after each step.
//!
//! Run against `fake-controller`:
//!   cargo run -p r9link --example async-bias-sweep --features async

use std::time::Duration;

use r9link::{AsyncDriver, AsyncTelemetryListener, CancellationToken, InstrumentConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = InstrumentConfig::default();
    let driver = AsyncDriver::from_config(&config)?;
    let listener = AsyncTelemetryListener::from_config(&config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    for step in 0..=8 {
        let volts = f64::from(10 + 5 * step) / 100.0;
        driver.set_bias(volts).await?;
        tokio::time::sleep(Duration::from_millis(200)).await;

        match listener.fetch_averaged_value_with_cancel(12700, &cancel).await {
            Ok(current) => println!("{volts:.2} V -> {current:e} A"),
            Err(err) if err.is_cancelled() => break,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
