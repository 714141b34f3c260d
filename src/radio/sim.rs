use log::{debug, info};
use lorawan::creator::DataPayloadCreator;
use lorawan::parser::FCtrl;
use tokio::sync::mpsc;

use super::{
    ChannelPlan, EventReceiver, EventSender, LorawanStack, RadioError, RadioEvent, SessionParams,
    TxParams,
};

/// Largest PHYPayload the backend will assemble.
const FRAME_CAPACITY: usize = 256;
/// MHDR + FHDR without FOpts + FPort + MIC.
const FRAME_OVERHEAD: usize = 13;

/// Radio-less stack backend for hosts without an attached concentrator.
///
/// Frame encoding is delegated to the `lorawan` crate with the installed
/// session; the encoded PHYPayload is logged instead of keyed into a
/// modem, and a queued uplink completes on the next protocol-loop
/// iteration. Hardware backends implement [`LorawanStack`] out of tree.
pub struct SimStack {
    session: Option<SessionParams>,
    plan: Option<ChannelPlan>,
    params: TxParams,
    fcnt_up: u32,
    in_flight: Option<Vec<u8>>,
    completed: Option<Vec<u8>>,
    events: EventSender,
}

impl SimStack {
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::channel(16);
        let stack = SimStack {
            session: None,
            plan: None,
            params: TxParams::default(),
            fcnt_up: 0,
            in_flight: None,
            completed: None,
            events: tx,
        };
        (stack, rx)
    }

    /// PHYPayload of the most recently completed transmission.
    pub fn last_frame(&self) -> Option<&[u8]> {
        self.completed.as_deref()
    }

    pub fn fcnt_up(&self) -> u32 {
        self.fcnt_up
    }
}

impl LorawanStack for SimStack {
    fn set_session(&mut self, session: &SessionParams) -> Result<(), RadioError> {
        self.fcnt_up = 0;
        self.session = Some(session.clone());
        info!("session installed for device address {:08X}", session.device_address);
        Ok(())
    }

    fn configure_channels(&mut self, plan: &ChannelPlan) -> Result<(), RadioError> {
        debug!("channel plan with {} channels, RX2 {:?}", plan.channels.len(), plan.rx2_dr);
        self.plan = Some(plan.clone());
        Ok(())
    }

    fn configure_tx(&mut self, params: &TxParams) -> Result<(), RadioError> {
        debug!("tx parameters {:?}", params);
        self.params = *params;
        Ok(())
    }

    fn tx_pending(&self) -> bool {
        self.in_flight.is_some()
    }

    fn queue_uplink(
        &mut self,
        port: u8,
        payload: &[u8],
        confirmed: bool,
    ) -> Result<(), RadioError> {
        if self.in_flight.is_some() {
            return Err(RadioError::Busy);
        }
        let session = self.session.as_ref().ok_or(RadioError::NoSession)?;
        if payload.len() + FRAME_OVERHEAD > FRAME_CAPACITY {
            return Err(RadioError::PayloadTooLong(payload.len()));
        }

        // Rotate through the configured channels the way a real MAC
        // hops; only the log line depends on it.
        let frequency_hz = self
            .plan
            .as_ref()
            .filter(|plan| !plan.channels.is_empty())
            .map(|plan| plan.channels[self.fcnt_up as usize % plan.channels.len()].frequency_hz);

        let device_address = session.device_address_bytes();
        let mut creator = DataPayloadCreator::new();
        creator
            .set_uplink(true)
            .set_confirmed(confirmed)
            .set_f_port(port)
            .set_dev_addr(&device_address)
            .set_fctrl(&FCtrl::new(0x00, true))
            .set_fcnt(self.fcnt_up);
        let frame = creator
            .build(
                payload,
                &[],
                &session.network_session_key,
                &session.app_session_key,
            )
            .map_err(RadioError::Encoding)?;

        info!(
            "uplink queued: fcnt {}, {} payload bytes, {} bytes on air at {:?} / {} Hz",
            self.fcnt_up,
            payload.len(),
            frame.len(),
            self.params.data_rate,
            frequency_hz.unwrap_or(0)
        );
        debug!("phypayload {}", hex::encode(frame));

        self.in_flight = Some(frame.to_vec());
        self.fcnt_up = self.fcnt_up.wrapping_add(1);
        Ok(())
    }

    fn run_once(&mut self) {
        if let Some(frame) = self.in_flight.take() {
            self.completed = Some(frame);
            let _ = self.events.try_send(RadioEvent::TxComplete { ack: false, downlink: None });
        }
    }
}
