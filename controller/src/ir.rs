use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::Context;
use esp_idf_hal::{
    gpio::OutputPin,
    peripheral::Peripheral,
    rmt::{
        config::{CarrierConfig, DutyPercent, TransmitConfig},
        PinState, Pulse, PulseTicks, RmtChannel, TxRmtDriver, VariableLengthSignal,
    },
    units::FromValueType,
};
use log::{info, warn};
use serde::Serialize;

use irbridge_common::{nec, Transmitter};

// 80 MHz APB / 80 gives 1 µs ticks, matching the NEC timing table.
const IR_TICK_DIVIDER: u8 = 80;
// A full NEC frame including its trailing gap.
const MIN_FRAME_INTERVAL_MS: u64 = 110;

enum IrBackend {
    Rmt(TxRmtDriver<'static>),
    Disabled,
}

pub struct IrTransmitter {
    backend: IrBackend,
    last_send_ms: Option<u64>,
    last_code: Option<u32>,
    carrier_khz: u32,
    sent_frames: u64,
    failed_frames: u64,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IrDiagnostics {
    pub enabled: bool,
    #[serde(rename = "carrierKHz")]
    pub carrier_khz: u32,
    #[serde(rename = "sentFrames")]
    pub sent_frames: u64,
    #[serde(rename = "lastCode")]
    pub last_code: Option<String>,
    #[serde(rename = "lastSendMs")]
    pub last_send_ms: Option<u64>,
    #[serde(rename = "failedFrames")]
    pub failed_frames: u64,
    #[serde(rename = "lastError")]
    pub last_error: Option<String>,
}

impl IrTransmitter {
    pub fn new_with_carrier<C, P>(
        channel: impl Peripheral<P = C> + 'static,
        pin: impl Peripheral<P = P> + 'static,
        carrier_khz: u32,
    ) -> anyhow::Result<Self>
    where
        C: RmtChannel,
        P: OutputPin,
    {
        let carrier = CarrierConfig::new()
            .frequency(carrier_khz.kHz().into())
            .carrier_level(PinState::High)
            .duty_percent(DutyPercent::new(nec::NEC_DUTY_PERCENT)?);

        let config = TransmitConfig::new()
            .clock_divider(IR_TICK_DIVIDER)
            .carrier(Some(carrier))
            .idle(Some(PinState::Low));

        let tx = TxRmtDriver::new(channel, pin, &config).context("failed to init RMT IR driver")?;

        Ok(Self {
            backend: IrBackend::Rmt(tx),
            last_send_ms: None,
            last_code: None,
            carrier_khz,
            sent_frames: 0,
            failed_frames: 0,
            last_error: None,
        })
    }

    pub fn disabled() -> Self {
        Self {
            backend: IrBackend::Disabled,
            last_send_ms: None,
            last_code: None,
            carrier_khz: nec::NEC_CARRIER_KHZ,
            sent_frames: 0,
            failed_frames: 0,
            last_error: None,
        }
    }

    pub fn diagnostics(&self) -> IrDiagnostics {
        IrDiagnostics {
            enabled: matches!(self.backend, IrBackend::Rmt(_)),
            carrier_khz: self.carrier_khz,
            sent_frames: self.sent_frames,
            last_code: self.last_code.map(|code| format!("0x{code:08X}")),
            last_send_ms: self.last_send_ms,
            failed_frames: self.failed_frames,
            last_error: self.last_error.clone(),
        }
    }

    fn send_frame(&mut self, code: u32) -> anyhow::Result<()> {
        if matches!(self.backend, IrBackend::Disabled) {
            warn!("IR disabled, dropping frame 0x{code:08X}");
            return Ok(());
        }

        self.rate_limit();

        let timings = nec::frame_timings(code);
        let mut pulses = Vec::with_capacity(timings.len());
        for (index, duration) in timings.iter().enumerate() {
            let level = if index % 2 == 0 {
                PinState::High
            } else {
                PinState::Low
            };

            pulses.push(Pulse::new(
                level,
                PulseTicks::new(*duration).context("invalid IR pulse duration")?,
            ));
        }

        let pulse_refs: Vec<&Pulse> = pulses.iter().collect();
        let mut signal = VariableLengthSignal::with_capacity(pulses.len());
        signal
            .push(pulse_refs)
            .context("failed to convert NEC timings to RMT signal")?;

        if let IrBackend::Rmt(tx) = &mut self.backend {
            tx.start_blocking(&signal)
                .context("failed to transmit IR frame over RMT")?;
        }

        self.last_send_ms = Some(monotonic_ms());
        self.last_code = Some(code);
        self.sent_frames = self.sent_frames.saturating_add(1);
        Ok(())
    }

    fn rate_limit(&mut self) {
        let now = monotonic_ms();
        if let Some(last) = self.last_send_ms {
            let elapsed = now.saturating_sub(last);
            if elapsed < MIN_FRAME_INTERVAL_MS {
                thread::sleep(Duration::from_millis(MIN_FRAME_INTERVAL_MS - elapsed));
            }
        }
    }
}

impl Transmitter for IrTransmitter {
    fn transmit(&mut self, code: u32) {
        match self.send_frame(code) {
            Ok(()) => {
                info!("IR frame sent [0x{code:08X}]");
                self.last_error = None;
            }
            Err(err) => {
                warn!("IR frame failed [0x{code:08X}]: {err:#}");
                self.failed_frames = self.failed_frames.saturating_add(1);
                self.last_error = Some(format!("{err:#}"));
            }
        }
    }
}

pub fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
