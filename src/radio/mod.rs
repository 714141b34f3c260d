pub mod sim;

use lorawan::keys::{AppSKey, NewSKey as NwkSKey};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::LorawanConfig;

pub type EventSender = mpsc::Sender<RadioEvent>;
pub type EventReceiver = mpsc::Receiver<RadioEvent>;

#[derive(Error, Debug)]
pub enum RadioError {
    #[error("radio hardware initialization failed: {0}")]
    HardwareInit(String),
    #[error("a transmission is already pending")]
    Busy,
    #[error("no session installed")]
    NoSession,
    #[error("payload of {0} bytes exceeds the radio frame limit")]
    PayloadTooLong(usize),
    #[error("frame encoding failed: {0:?}")]
    Encoding(lorawan::creator::Error),
}

/// Protocol events surfaced by the stack. Each stack backend owns an
/// [`EventSender`]; the matching receiver is drained by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Joining,
    Joined,
    JoinFailed,
    TxComplete { ack: bool, downlink: Option<Vec<u8>> },
    LinkDead,
}

/// ABP session material handed to the stack. Frame counters restart at
/// zero whenever a session is installed.
#[derive(Clone)]
pub struct SessionParams {
    pub device_address: u32,
    pub network_session_key: NwkSKey,
    pub app_session_key: AppSKey,
}

impl SessionParams {
    pub fn from_config(config: &LorawanConfig) -> Self {
        SessionParams {
            device_address: config.device_address,
            network_session_key: config.network_session_key,
            app_session_key: config.app_session_key,
        }
    }

    /// Device address in on-air FHDR order (LSB first).
    pub fn device_address_bytes(&self) -> [u8; 4] {
        self.device_address.to_le_bytes()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    Sf12,
    Sf11,
    Sf10,
    Sf9,
    Sf8,
    Sf7,
    Fsk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    pub frequency_hz: u32,
    pub min_dr: DataRate,
    pub max_dr: DataRate,
}

impl Channel {
    pub const fn new(frequency_hz: u32, min_dr: DataRate, max_dr: DataRate) -> Self {
        Channel { frequency_hz, min_dr, max_dr }
    }
}

/// Regional channel plan passed to the stack at bring-up.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    pub channels: Vec<Channel>,
    pub rx2_dr: DataRate,
}

impl ChannelPlan {
    /// The EU868 plan of the deployment: the three default channels, five
    /// additional g-band channels and the g2-band FSK channel. RX2 listens
    /// on SF9 as used by The Things Network.
    pub fn eu868() -> Self {
        ChannelPlan {
            channels: vec![
                Channel::new(868_100_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(868_300_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(868_500_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(867_100_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(867_300_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(867_500_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(867_700_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(867_900_000, DataRate::Sf12, DataRate::Sf7),
                Channel::new(868_800_000, DataRate::Fsk, DataRate::Fsk),
            ],
            rx2_dr: DataRate::Sf9,
        }
    }
}

/// Uplink transmission parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    pub data_rate: DataRate,
    pub tx_power_dbm: i8,
    pub adr: bool,
    pub link_check: bool,
}

impl Default for TxParams {
    fn default() -> Self {
        // SF7 at 14 dBm, ADR and link check validation disabled.
        TxParams { data_rate: DataRate::Sf7, tx_power_dbm: 14, adr: false, link_check: false }
    }
}

/// Boundary to the external LoRaWAN MAC/PHY stack. The library only
/// configures the stack, queues payloads and consumes its events; frame
/// encoding, duty-cycle bookkeeping and receive windows are the stack's
/// business.
pub trait LorawanStack {
    fn set_session(&mut self, session: &SessionParams) -> Result<(), RadioError>;
    fn configure_channels(&mut self, plan: &ChannelPlan) -> Result<(), RadioError>;
    fn configure_tx(&mut self, params: &TxParams) -> Result<(), RadioError>;

    /// Whether a queued transmission has not completed yet.
    fn tx_pending(&self) -> bool;

    /// Queues one application payload for transmission at the next
    /// possible time.
    fn queue_uplink(&mut self, port: u8, payload: &[u8], confirmed: bool)
        -> Result<(), RadioError>;

    /// Runs one iteration of the protocol loop.
    fn run_once(&mut self);
}

/// Applies the static session and regional parameters in the bring-up
/// order the network expects.
pub fn configure_stack<S: LorawanStack>(
    stack: &mut S,
    config: &LorawanConfig,
) -> Result<(), RadioError> {
    stack.set_session(&SessionParams::from_config(config))?;
    stack.configure_channels(&ChannelPlan::eu868())?;
    stack.configure_tx(&TxParams::default())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eu868_plan() {
        let plan = ChannelPlan::eu868();
        assert_eq!(plan.channels.len(), 9);
        assert_eq!(plan.channels[0].frequency_hz, 868_100_000);
        assert_eq!(plan.channels[8].max_dr, DataRate::Fsk);
        assert_eq!(plan.rx2_dr, DataRate::Sf9);
    }

    #[test]
    fn test_device_address_wire_order() {
        let config = crate::config::LorawanConfig::from_json(
            r#"{
                "deviceEui": "0000000000000000",
                "applicationEui": "0000000000000000",
                "deviceAddress": "26011BDA",
                "networkSessionKey": "00000000000000000000000000000000",
                "appSessionKey": "00000000000000000000000000000000",
                "obisSelection": "1.8.0"
            }"#,
        )
        .unwrap();
        let session = SessionParams::from_config(&config);
        assert_eq!(session.device_address_bytes(), [0xDA, 0x1B, 0x01, 0x26]);
    }
}
