//! Synchronous event loop: one shared external UDP socket, one stdin-driven
//! JSON control channel, and the pacing/timeout ticks every live session
//! needs. No async runtime; this gateway processes one datagram or one
//! control line at a time, same as the connectivity-check pacing it drives.

use std::io::{self, BufRead, Write};
use std::net::UdpSocket;
use std::str::FromStr;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rtc_gateway::control::{self, Event, Request};
use rtc_gateway::{GatewayConfig, Identity, Proxy};

const MAX_DATAGRAM: usize = 1500;
const IDLE_POLL: Duration = Duration::from_millis(50);

fn main() -> io::Result<()> {
    let log_level = std::env::var("RTC_GATEWAY_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::new()
        .filter(None, log::LevelFilter::from_str(&log_level).unwrap_or(log::LevelFilter::Info))
        .init();

    let host = std::env::var("RTC_GATEWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("RTC_GATEWAY_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(40000);
    let config = GatewayConfig::new(host, port);
    config.validate().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let external_addr = config.external_addr().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let socket = UdpSocket::bind(external_addr)?;
    socket.set_read_timeout(Some(IDLE_POLL))?;
    log::info!("listening on {external_addr}");

    let identity = Identity::generate().map_err(|e| io::Error::other(e.to_string()))?;
    log::info!("certificate fingerprint {}", identity.fingerprint());

    let mut proxy = Proxy::new(external_addr);
    let requests = spawn_stdin_reader();

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        while let Ok(line) = requests.try_recv() {
            match serde_json::from_str::<Request>(&line) {
                Ok(request) => {
                    let events = control::handle_request(&mut proxy, &identity, &config, request, Instant::now());
                    emit_events(&events);
                }
                Err(err) => log::warn!("malformed control line: {err}"),
            }
        }

        match socket.recv_from(&mut buf) {
            Ok((n, source)) => {
                match proxy.handle_external_datagram(source, &buf[..n], &identity, &config, Instant::now()) {
                    Ok(outbound) => send_outbound(&socket, outbound),
                    Err(err) => log::warn!("datagram from {source} rejected: {err}"),
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock || err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) => return Err(err),
        }

        tick_sessions(&mut proxy, &socket);
    }
}

fn tick_sessions(proxy: &mut Proxy, socket: &UdpSocket) {
    let now = Instant::now();
    for (uuid, session) in proxy.sessions.iter_mut() {
        let checks = session.tick(now);
        for (_stream_index, remote, request) in checks {
            if let Err(err) = socket.send_to(&request, remote) {
                log::warn!("session {uuid} connectivity check to {remote} failed: {err}");
            }
        }

        for stream in session.streams.iter_mut() {
            for (remote, conn) in stream.dtls.iter_mut() {
                if conn.cookie_rotation_due() <= now {
                    conn.rotate_cookies(now);
                }
                if conn.poll_timeout().map(|deadline| deadline <= now).unwrap_or(false) {
                    match conn.handle_timeout(now) {
                        Ok(flight) => {
                            for packet in flight {
                                if let Err(err) = socket.send_to(&packet, *remote) {
                                    log::warn!("session {uuid} dtls retransmit to {remote} failed: {err}");
                                }
                            }
                        }
                        Err(err) => log::warn!("session {uuid} dtls handshake with {remote} timed out: {err}"),
                    }
                }
            }
        }

        let state = session.reduce_state(now);
        if state == rtc_gateway::SessionState::Completed {
            log::debug!("session {uuid} completed");
        }
    }
}

fn send_outbound(socket: &UdpSocket, outbound: Vec<rtc_gateway::demux::Outbound>) {
    for item in outbound {
        let (addr, bytes) = match item {
            rtc_gateway::demux::Outbound::External(addr, bytes) => (addr, bytes),
            rtc_gateway::demux::Outbound::Internal(addr, bytes) => (addr, bytes),
        };
        if let Err(err) = socket.send_to(&bytes, addr) {
            log::warn!("send to {addr} failed: {err}");
        }
    }
}

fn emit_events(events: &[Event]) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for event in events {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(handle, "{line}");
        }
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if !line.trim().is_empty() => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
    rx
}
