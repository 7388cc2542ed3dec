/**
 * Serial link to the low level controller
 *
 * Reader thread: vehicle state frames go into the process values cell,
 * control mode replies go to whoever is waiting on the mode query.
 * Forwarder thread: every set point the helm publishes goes out as a frame.
 */

pub mod protocol;
pub use protocol::*;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::catalog::{ControlMode, ControlModeSource};
use crate::dof::{ControlCommand, VehicleState};
use crate::error::{HelmError, Result};
use crate::helm::TOPIC_PROCESS_VALUES;
use crate::pubsub::{Latest, Subscriber, TopicRegistry};

const READ_TIMEOUT: Duration = Duration::from_millis(10);
const FORWARD_POLL: Duration = Duration::from_millis(2);
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

pub struct SerialLink {
    port_name: String,
    writer: SharedPort,
    modes_rx: Receiver<Vec<ControlMode>>,
    reply_timeout: Duration,
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl SerialLink {
    /// Opens the port and starts the reader thread.
    pub fn open(port_name: &str, baud_rate: u32, bus: &TopicRegistry) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        let reader_port = port.try_clone()?;

        info!(port = port_name, baud = baud_rate, "serial link open");

        let running = Arc::new(AtomicBool::new(true));
        let (modes_tx, modes_rx) = mpsc::channel();
        let process_values = bus.get_or_create_latest(TOPIC_PROCESS_VALUES);

        let reader = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("helm-link-rx".into())
                .spawn(move || read_loop(reader_port, process_values, modes_tx, running))?
        };

        Ok(Self {
            port_name: port_name.to_string(),
            writer: Arc::new(Mutex::new(port)),
            modes_rx,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            running,
            threads: vec![reader],
        })
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sends every set point published on `set_points` until shutdown.
    pub fn start_forwarding(&mut self, set_points: Subscriber<ControlCommand>) -> Result<()> {
        let writer = Arc::clone(&self.writer);
        let running = Arc::clone(&self.running);

        let handle = thread::Builder::new()
            .name("helm-link-tx".into())
            .spawn(move || forward_loop(&writer, &set_points, &running))?;

        self.threads.push(handle);
        Ok(())
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        debug!(port = %self.port_name, "serial link closed");
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl ControlModeSource for SerialLink {
    fn control_modes(&mut self) -> Result<Vec<ControlMode>> {
        // stale replies from earlier attempts are still valid answers
        if let Ok(modes) = self.modes_rx.try_recv() {
            return Ok(modes);
        }

        send_frame(&self.writer, MsgType::GetControlModes, &[])?;

        match self.modes_rx.recv_timeout(self.reply_timeout) {
            Ok(modes) => Ok(modes),
            Err(RecvTimeoutError::Timeout) => Err(HelmError::ControllerUnavailable(format!(
                "no control modes reply on {} within {:?}",
                self.port_name, self.reply_timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(HelmError::ControllerUnavailable("serial reader stopped".into()))
            }
        }
    }
}

fn send_frame(writer: &SharedPort, msg_type: MsgType, payload: &[u8]) -> Result<()> {
    let frame = encode_frame(msg_type, payload)?;
    let mut port = writer.lock().unwrap_or_else(PoisonError::into_inner);
    port.write_all(&frame)?;
    port.flush()?;
    Ok(())
}

fn forward_loop(writer: &SharedPort, set_points: &Subscriber<ControlCommand>, running: &AtomicBool) {
    let mut reported = 0;

    while running.load(Ordering::SeqCst) {
        let Some(command) = set_points.try_recv() else {
            thread::sleep(FORWARD_POLL);
            continue;
        };

        let missed = set_points.missed();
        if missed > reported {
            warn!(
                topic = set_points.topic_name(),
                dropped = missed - reported,
                "set points overwritten before they could be sent"
            );
            reported = missed;
        }

        let sent = encode_set_point(&command).and_then(|payload| send_frame(writer, MsgType::SetPoint, &payload));
        if let Err(e) = sent {
            warn!(error = %e, "failed to send set point");
        }
    }
}

fn read_loop(
    mut port: Box<dyn SerialPort>,
    process_values: Arc<Latest<VehicleState>>,
    modes_tx: Sender<Vec<ControlMode>>,
    running: Arc<AtomicBool>,
) {
    let mut decoder = FrameDecoder::new();
    let mut read_buf = [0u8; 256];

    while running.load(Ordering::SeqCst) {
        match port.read(&mut read_buf) {
            Ok(n) if n > 0 => {
                decoder.extend(&read_buf[..n]);
                while let Some(frame) = decoder.next_frame() {
                    dispatch(frame, &process_values, &modes_tx);
                }
            }
            Ok(_) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                warn!(error = %e, "serial read error");
                thread::sleep(READ_TIMEOUT);
            }
        }
    }
}

fn dispatch(frame: Frame, process_values: &Latest<VehicleState>, modes_tx: &Sender<Vec<ControlMode>>) {
    match frame.msg_type {
        MsgType::ProcessValues => match decode_process_values(&frame.payload) {
            Ok(state) => process_values.store(state),
            Err(e) => debug!(error = %e, "dropping process values frame"),
        },
        MsgType::ControlModes => match decode_control_modes(&frame.payload) {
            Ok(modes) => {
                let _ = modes_tx.send(modes);
            }
            Err(e) => warn!(error = %e, "dropping control modes frame"),
        },
        other => debug!(msg_type = ?other, "ignoring frame not meant for the helm"),
    }
}
