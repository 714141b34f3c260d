//! One-shot variant: read the latest meter reading, send it once, wait
//! for the completion event and exit.

use std::env;
use std::process;

use log::{error, info};

use meter2lora::config::{self, LorawanConfig};
use meter2lora::radio::{self, sim::SimStack};
use meter2lora::reading;
use meter2lora::uplink::{self, RunMode, UplinkDriver};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let default_filter = env::var("M2L_LOG_LEVEL").unwrap_or("info".to_string());
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(default_filter));

    if run().await.is_err() {
        process::exit(1);
    }
}

async fn run() -> Result<(), ()> {
    let config_path = config::config_path();
    let config = match LorawanConfig::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("unable to load {}: {}", config_path.display(), err);
            return Err(());
        }
    };

    let (mut stack, events) = SimStack::new();
    if let Err(err) = radio::configure_stack(&mut stack, &config) {
        error!("radio bring-up failed: {}", err);
        return Err(());
    }

    info!(
        "m2l-send starting, device address {:08X}, obis selection {}",
        config.device_address, config.obis_selection
    );

    let mut driver = UplinkDriver::new(stack, events, config, reading::path_file());
    uplink::spawn_ctrl_c_handler(driver.shutdown_handle());

    match driver.run(RunMode::Once).await {
        Ok(()) => {
            info!("done");
            Ok(())
        }
        Err(err) => {
            error!("send failed: {}", err);
            Err(())
        }
    }
}
