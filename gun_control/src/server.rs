//! Modbus RTU framing over a TCP stream.
//!
//! One master at a time. The listener is non-blocking and polled; a
//! connected master is read with a one-tick timeout so the receiver's idle
//! timer advances at the control tick rate even when the line is quiet.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use gun_common::gun::config::BoardConfig;
use gun_common::gun::interface::ControlSource;
use gun_common::prelude::TICK_TIME;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::modbus::receiver::RequestBytes;
use crate::modbus::{ControlShadow, ModbusSlave, RtuReceiver};
use crate::state::SharedControlState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// RTU-over-TCP slave bound to the shared control state.
#[derive(Debug)]
pub struct ModbusServer {
    listener: TcpListener,
    shared: Arc<SharedControlState>,
    slave: ModbusSlave,
    source: ControlSource,
    timeout_ticks: u16,
}

impl ModbusServer {
    pub fn bind(
        addr: SocketAddr,
        shared: Arc<SharedControlState>,
        config: &BoardConfig,
        source: ControlSource,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        info!(%addr, slave = config.modbus.slave_address, %source, "Modbus server listening");
        Ok(Self {
            listener,
            shared,
            slave: ModbusSlave::new(config.modbus.slave_address),
            source,
            timeout_ticks: config.modbus.receive_timeout_ticks,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    #[inline]
    pub fn slave(&self) -> &ModbusSlave {
        &self.slave
    }

    /// Accept and serve masters until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), ServerError> {
        while running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(%peer, "Modbus master connected");
                    match self.serve(stream, running) {
                        Ok(()) => info!(%peer, "Modbus master disconnected"),
                        Err(e) => warn!(%peer, error = %e, "Modbus connection dropped"),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(TICK_TIME),
                Err(e) => return Err(e.into()),
            }
        }
        let stats = self.slave.stats();
        info!(
            received = stats.received,
            answered = stats.answered,
            exceptions = stats.exceptions,
            crc_errors = stats.crc_errors,
            "Modbus server stopped"
        );
        Ok(())
    }

    fn serve(&mut self, mut stream: TcpStream, running: &AtomicBool) -> Result<(), ServerError> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(TICK_TIME))?;
        stream.set_nodelay(true)?;
        let mut receiver = RtuReceiver::new(self.timeout_ticks);
        let mut buf = [0u8; 64];

        while running.load(Ordering::Relaxed) {
            let n = match stream.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if receiver.tick() {
                        debug!("partial request discarded after idle timeout");
                    }
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            for &byte in &buf[..n] {
                if let Some(request) = receiver.push(byte) {
                    receiver.begin_transmit();
                    let sent = self.answer(&mut stream, &request);
                    receiver.finish();
                    sent?;
                }
            }
        }
        Ok(())
    }

    fn answer(&mut self, stream: &mut TcpStream, request: &RequestBytes) -> Result<(), ServerError> {
        let response = {
            let mut state = self.shared.lock();
            let mut map = ControlShadow::new(&mut state, self.source);
            self.slave.handle(request, &mut map)
        };
        if let Some(frame) = response {
            stream.write_all(&frame)?;
        }
        Ok(())
    }
}
