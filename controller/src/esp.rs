use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
};

use anyhow::{anyhow, Context};
use embedded_svc::{
    http::Method,
    io::Write,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::gpio::{AnyIOPin, Input, Output, PinDriver, Pull};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{gpio::AnyOutputPin, modem::Modem, prelude::Peripherals, rmt::RMT},
    http::server::{Configuration as HttpConfiguration, EspHttpServer},
    log::EspLogger,
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use serde::Serialize;

use irbridge_common::{
    config::NetworkConfig,
    http::{changed_flag, not_found_body, CHANGED_HEADER}, run_actions, CommandEngine, CommandParams, CommandRegistry, Dispatch,
    IrHardwareConfig, Palette, RuntimeConfig, Transmitter,
};

use crate::ir::{monotonic_ms, IrTransmitter};

const BUTTON_POLL_MS: u64 = 200;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

struct Indicator {
    pin: PinDriver<'static, AnyOutputPin, Output>,
    duration_ms: u64,
    lit_until_ms: Option<u64>,
}

impl Indicator {
    fn pulse(&mut self, now_ms: u64) {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to drive indicator LED: {err}");
            return;
        }
        self.lit_until_ms = Some(now_ms.saturating_add(self.duration_ms));
    }

    fn update(&mut self, now_ms: u64) {
        let Some(until) = self.lit_until_ms else {
            return;
        };
        if now_ms < until {
            return;
        }
        if let Err(err) = self.pin.set_low() {
            warn!("failed to drive indicator LED: {err}");
        }
        self.lit_until_ms = None;
    }

    fn is_active(&self) -> bool {
        self.lit_until_ms.is_some()
    }
}

struct Gateway {
    ir: IrTransmitter,
    indicator: Option<Indicator>,
}

impl Transmitter for Gateway {
    fn transmit(&mut self, code: u32) {
        self.ir.transmit(code);
    }

    fn pulse_indicator(&mut self) {
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.pulse(monotonic_ms());
        }
    }
}

struct Bridge {
    engine: CommandEngine,
    gateway: Gateway,
}

#[derive(Clone)]
struct SharedState {
    bridge: Arc<Mutex<Bridge>>,
    registry: Arc<CommandRegistry>,
}

impl SharedState {
    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Bridge>> {
        self.bridge
            .lock()
            .map_err(|_| anyhow!("bridge state lock poisoned"))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut runtime = RuntimeConfig::default();
    ensure_wifi_defaults(&mut runtime);
    runtime.sanitize();

    let Peripherals { modem, rmt, .. } = Peripherals::take()?;
    let ir = match init_ir_transmitter(rmt, &runtime.ir) {
        Ok(transmitter) => {
            info!(
                "IR transmitter initialized on RMT channel{} / GPIO{} @ {}kHz",
                runtime.ir.rmt_channel, runtime.ir.tx_pin, runtime.ir.carrier_khz
            );
            transmitter
        }
        Err(err) => {
            warn!("failed to initialize IR transmitter, running disabled: {err:#}");
            IrTransmitter::disabled()
        }
    };
    let indicator = init_indicator(runtime.ir.indicator_pin, runtime.bridge.indicator_ms);
    let mut button = init_button(runtime.ir.button_pin)?;

    let wifi = connect_wifi(modem, sys_loop, nvs_partition, &runtime.network)
        .context("wifi startup failed")?;

    let palette = Palette::new(runtime.palette.clone()).unwrap_or_else(|err| {
        warn!("configured palette rejected ({err}); using built-in palette");
        Palette::default()
    });
    let registry = CommandRegistry::build(&runtime.bridge, &palette, &runtime.raw_commands);
    let state = SharedState {
        bridge: Arc::new(Mutex::new(Bridge {
            engine: CommandEngine::new(runtime.bridge.clone(), palette),
            gateway: Gateway { ir, indicator },
        })),
        registry: Arc::new(registry),
    };

    let server = create_http_server(state.clone(), runtime.network.http_port)?;
    info!("IR bridge `{}` ready", runtime.network.hostname);

    // Keep services alive for the program lifetime.
    let _wifi = wifi;
    let _server = server;

    loop {
        if let Err(err) = poll_button(&state, &mut button) {
            warn!("button handling failed: {err:#}");
        }
        thread::sleep(Duration::from_millis(BUTTON_POLL_MS));
    }
}

/// Acts on a held button only once the indicator from the previous frame has
/// gone dark, which also debounces the contact.
fn poll_button(
    state: &SharedState,
    button: &mut PinDriver<'static, AnyIOPin, Input>,
) -> anyhow::Result<()> {
    let mut guard = state.lock()?;
    let bridge = &mut *guard;
    let now_ms = monotonic_ms();

    let indicator_active = match bridge.gateway.indicator.as_mut() {
        Some(indicator) => {
            indicator.update(now_ms);
            indicator.is_active()
        }
        None => false,
    };

    if indicator_active || !button.is_low() {
        return Ok(());
    }

    let dispatch = bridge.engine.button_pressed();
    info!(
        "button pressed: changed={} pulses={}",
        dispatch.changed,
        dispatch.pulse_count()
    );
    run_ir_actions(&mut bridge.gateway, &dispatch);
    Ok(())
}

fn run_ir_actions(gateway: &mut Gateway, dispatch: &Dispatch) {
    run_actions(gateway, &dispatch.actions, |ms| {
        thread::sleep(Duration::from_millis(ms))
    });
}

fn ensure_wifi_defaults(runtime: &mut RuntimeConfig) {
    if runtime.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            runtime.network.wifi_ssid = ssid.to_string();
        }
    }

    if runtime.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            runtime.network.wifi_pass = pass.to_string();
        }
    }
}

fn create_http_server(state: SharedState, port: u16) -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        http_port: port,
        stack_size: 10 * 1024,
        max_uri_handlers: state.registry.descriptors().len() + 5,
        uri_match_wildcard: true,
        ..Default::default()
    };

    let mut server = EspHttpServer::new(&conf)?;

    server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
        req.into_ok_response()?.write_all(b"<html>Done!</html>")?;
        Ok(())
    })?;

    {
        let state = state.clone();
        server.fn_handler("/state", Method::Get, move |req| {
            let snapshot = state.lock()?.engine.current_state();
            write_json(req, 200, &[], &snapshot)
        })?;
    }

    {
        let state = state.clone();
        server.fn_handler("/diagnostics", Method::Get, move |req| {
            let diagnostics = state.lock()?.gateway.ir.diagnostics();
            write_json(req, 200, &[], &diagnostics)
        })?;
    }

    for descriptor in state.registry.descriptors().iter().cloned() {
        let state = state.clone();
        let uri = format!("/{}", descriptor.identifier);
        server.fn_handler(&uri, Method::Get, move |req| {
            let uri = req.uri().to_string();
            let params = CommandParams {
                value: query_param(&uri, "value"),
            };

            let result = {
                let mut guard = state.lock()?;
                let bridge = &mut *guard;
                bridge
                    .engine
                    .dispatch(&descriptor, &params)
                    .map(|dispatch| {
                        info!(
                            "command `{}`: changed={} pulses={}",
                            descriptor.identifier,
                            dispatch.changed,
                            dispatch.pulse_count()
                        );
                        run_ir_actions(&mut bridge.gateway, &dispatch);
                        dispatch
                    })
            };

            match result {
                Ok(dispatch) => write_json(
                    req,
                    200,
                    &[(CHANGED_HEADER, changed_flag(dispatch.changed))],
                    &dispatch.snapshot,
                ),
                Err(err) => {
                    warn!("command `{}` rejected: {err}", descriptor.identifier);
                    let body = ErrorBody {
                        error: err.to_string(),
                    };
                    write_json(req, 400, &[], &body)
                }
            }
        })?;
    }

    // Registered last: with wildcard matching, handlers are tried in order.
    for (method, label) in [(Method::Get, "GET"), (Method::Post, "POST")] {
        server.fn_handler::<anyhow::Error, _>("/*", method, move |req| {
            let uri = req.uri().to_string();
            let path = uri.split('?').next().unwrap_or_default();
            let body = not_found_body(path, label, &query_pairs(&uri));
            req.into_response(404, None, &[("Content-Type", "text/plain")])?
                .write_all(body.as_bytes())?;
            Ok(())
        })?;
    }

    Ok(server)
}

fn write_json<T: Serialize>(
    req: esp_idf_svc::http::server::Request<
        &mut esp_idf_svc::http::server::EspHttpConnection<'_>,
    >,
    status_code: u16,
    extra_headers: &[(&str, &str)],
    payload: &T,
) -> anyhow::Result<()> {
    let body = serde_json::to_vec(payload)?;
    let mut headers = vec![("Content-Type", "application/json; charset=utf-8")];
    headers.extend_from_slice(extra_headers);
    req.into_response(status_code, None, &headers)?
        .write_all(&body)?;
    Ok(())
}

fn query_pairs(uri: &str) -> Vec<(String, String)> {
    let Some((_, query)) = uri.split_once('?') else {
        return Vec::new();
    };

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (
                percent_decode(&name.replace('+', " ")),
                percent_decode(&value.replace('+', " ")),
            )
        })
        .collect()
}

fn query_param(uri: &str, key: &str) -> Option<String> {
    query_pairs(uri)
        .into_iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value)
}

// Browsers escape `(` `)` and `,`; undo `%XX` so the color parser sees digits.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[index + 1..index + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                decoded.push(byte);
                index += 3;
                continue;
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn init_ir_transmitter(rmt: RMT, ir: &IrHardwareConfig) -> anyhow::Result<IrTransmitter> {
    if ir.tx_pin < 0 {
        return Err(anyhow!("invalid tx pin: {}", ir.tx_pin));
    }

    let pin = ir.tx_pin;
    let carrier_khz = ir.carrier_khz;

    match ir.rmt_channel {
        0 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel0, AnyOutputPin::new(pin), carrier_khz)
        },
        1 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel1, AnyOutputPin::new(pin), carrier_khz)
        },
        2 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel2, AnyOutputPin::new(pin), carrier_khz)
        },
        3 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel3, AnyOutputPin::new(pin), carrier_khz)
        },
        #[cfg(any(esp32, esp32s3))]
        4 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel4, AnyOutputPin::new(pin), carrier_khz)
        },
        #[cfg(any(esp32, esp32s3))]
        5 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel5, AnyOutputPin::new(pin), carrier_khz)
        },
        #[cfg(any(esp32, esp32s3))]
        6 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel6, AnyOutputPin::new(pin), carrier_khz)
        },
        #[cfg(any(esp32, esp32s3))]
        7 => unsafe {
            IrTransmitter::new_with_carrier(rmt.channel7, AnyOutputPin::new(pin), carrier_khz)
        },
        _ => Err(anyhow!("unsupported RMT channel: {}", ir.rmt_channel)),
    }
}

fn init_indicator(pin: i32, duration_ms: u64) -> Option<Indicator> {
    let driver = unsafe { PinDriver::output(AnyOutputPin::new(pin)) };
    match driver {
        Ok(mut pin) => {
            let _ = pin.set_low();
            Some(Indicator {
                pin,
                duration_ms,
                lit_until_ms: None,
            })
        }
        Err(err) => {
            warn!("indicator LED unavailable on GPIO{pin}: {err}");
            None
        }
    }
}

fn init_button(pin: i32) -> anyhow::Result<PinDriver<'static, AnyIOPin, Input>> {
    let mut button = unsafe { PinDriver::input(AnyIOPin::new(pin)) }
        .with_context(|| format!("failed to claim button on GPIO{pin}"))?;
    button
        .set_pull(Pull::Up)
        .context("failed to enable button pull-up")?;
    Ok(button)
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    network: &NetworkConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut attempt = 1;
    loop {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect().and_then(|()| wifi.wait_netif_up()) {
            Ok(()) => break,
            Err(err) if attempt < WIFI_CONNECT_ATTEMPTS => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                let _ = wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
                attempt += 1;
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!(
                    "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"
                )));
            }
        }
    }

    let ip = wifi.wifi().sta_netif().get_ip_info()?;
    info!("wifi connected, IP address {}", ip.ip);

    drop(wifi);
    Ok(esp_wifi)
}
