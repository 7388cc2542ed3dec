// frame format: [SYNC][TYPE][LEN][PAYLOAD...][CHECKSUM]
//              0xAA  1byte 1byte  LEN bytes   1byte
// checksum is the wrapping byte sum of TYPE, LEN and PAYLOAD

use crate::catalog::ControlMode;
use crate::dof::{ControlCommand, Dof, Vector3, VehicleState};
use crate::error::{HelmError, Result};

pub const SYNC_BYTE: u8 = 0xAA;
pub const MAX_MSG_SIZE: usize = 244;

const VECTOR_SIZE: usize = 12;                              // 3 * f32
pub const PROCESS_VALUES_SIZE: usize = 4 * VECTOR_SIZE + 8; // 4 vectors + f64 stamp

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    ProcessValues = 0x01,
    SetPoint = 0x02,
    GetControlModes = 0x03,
    ControlModes = 0x04,
}

impl MsgType {
    pub fn from_u8(val: u8) -> Option<Self> {
        match val {
            0x01 => Some(MsgType::ProcessValues),
            0x02 => Some(MsgType::SetPoint),
            0x03 => Some(MsgType::GetControlModes),
            0x04 => Some(MsgType::ControlModes),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub msg_type: MsgType,
    pub payload: Vec<u8>,
}

pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

pub fn encode_frame(msg_type: MsgType, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_MSG_SIZE {
        return Err(HelmError::Protocol(format!(
            "payload of {} bytes exceeds {}", payload.len(), MAX_MSG_SIZE
        )));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.push(SYNC_BYTE);
    frame.push(msg_type as u8);
    frame.push(payload.len() as u8);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame[1..]));
    Ok(frame)
}

/// Reassembles frames from a byte stream, resynchronising on the sync byte.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    rx_buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder { rx_buffer: Vec::with_capacity(512) }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.rx_buffer.extend_from_slice(bytes);
    }

    /// Next complete, valid frame. Corrupt or unknown frames are dropped.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let sync_pos = match self.rx_buffer.iter().position(|&b| b == SYNC_BYTE) {
                Some(pos) => pos,
                None => {
                    self.rx_buffer.clear();
                    return None;
                }
            };
            if sync_pos > 0 {
                self.rx_buffer.drain(0..sync_pos);
            }

            if self.rx_buffer.len() < 4 {
                return None;
            }

            let len = self.rx_buffer[2] as usize;
            if len > MAX_MSG_SIZE {
                self.rx_buffer.remove(0);
                continue;
            }

            let frame_len = 4 + len;
            if self.rx_buffer.len() < frame_len {
                return None;
            }

            let expected = self.rx_buffer[3 + len];
            if checksum(&self.rx_buffer[1..3 + len]) != expected {
                self.rx_buffer.remove(0);
                continue;
            }

            let msg_type = MsgType::from_u8(self.rx_buffer[1]);
            let payload = self.rx_buffer[3..3 + len].to_vec();
            self.rx_buffer.drain(0..frame_len);

            if let Some(msg_type) = msg_type {
                return Some(Frame { msg_type, payload });
            }
        }
    }
}

// little endian reader over a payload
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        let bytes = self.data.get(self.pos..end)
            .ok_or_else(|| HelmError::Protocol(format!("payload truncated at byte {}", self.pos)))?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn f32(&mut self) -> Result<f64> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(f32::from_le_bytes(raw) as f64)
    }

    fn f64(&mut self) -> Result<f64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(raw))
    }

    fn vector(&mut self) -> Result<Vector3> {
        Ok(Vector3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HelmError::Protocol("string is not valid utf-8".into()))
    }
}

fn put_vector(out: &mut Vec<u8>, v: &Vector3) {
    for c in [v.x, v.y, v.z] {
        out.extend_from_slice(&(c as f32).to_le_bytes());
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u8::try_from(s.len())
        .map_err(|_| HelmError::Protocol(format!("string '{s}' too long")))?;
    out.push(len);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn decode_process_values(payload: &[u8]) -> Result<VehicleState> {
    let mut r = Reader::new(payload);
    Ok(VehicleState {
        position: r.vector()?,
        orientation: r.vector()?,
        velocity: r.vector()?,
        angular_rate: r.vector()?,
        stamp: r.f64()?,
    })
}

pub fn encode_process_values(state: &VehicleState) -> Vec<u8> {
    let mut out = Vec::with_capacity(PROCESS_VALUES_SIZE);
    for v in [&state.position, &state.orientation, &state.velocity, &state.angular_rate] {
        put_vector(&mut out, v);
    }
    out.extend_from_slice(&state.stamp.to_le_bytes());
    out
}

pub fn encode_set_point(command: &ControlCommand) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(PROCESS_VALUES_SIZE + 1 + command.control_mode.len());
    for v in [&command.position, &command.orientation, &command.velocity, &command.angular_rate] {
        put_vector(&mut out, v);
    }
    out.extend_from_slice(&command.stamp.to_le_bytes());
    put_string(&mut out, &command.control_mode)?;
    Ok(out)
}

pub fn decode_set_point(payload: &[u8]) -> Result<ControlCommand> {
    let mut r = Reader::new(payload);
    Ok(ControlCommand {
        position: r.vector()?,
        orientation: r.vector()?,
        velocity: r.vector()?,
        angular_rate: r.vector()?,
        stamp: r.f64()?,
        control_mode: r.string()?,
    })
}

// [count] then per mode: [name len][name][dof count][dof indices]
pub fn encode_control_modes(modes: &[ControlMode]) -> Result<Vec<u8>> {
    let count = u8::try_from(modes.len())
        .map_err(|_| HelmError::Protocol("too many control modes".into()))?;
    let mut out = vec![count];
    for mode in modes {
        put_string(&mut out, &mode.name)?;
        out.push(mode.dofs.len() as u8);
        out.extend(mode.dofs.iter().map(|d| *d as u8));
    }
    Ok(out)
}

/// Unknown DOF indices are dropped from the mode; they can't be arbitrated.
pub fn decode_control_modes(payload: &[u8]) -> Result<Vec<ControlMode>> {
    let mut r = Reader::new(payload);
    let count = r.u8()?;
    let mut modes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = r.string()?;
        let dof_count = r.u8()? as usize;
        let dofs = r.take(dof_count)?.iter().filter_map(|i| Dof::from_index(*i)).collect();
        modes.push(ControlMode { name, dofs });
    }
    Ok(modes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_conversion() {
        assert_eq!(MsgType::from_u8(0x01), Some(MsgType::ProcessValues));
        assert_eq!(MsgType::from_u8(0x04), Some(MsgType::ControlModes));
        assert_eq!(MsgType::from_u8(0xFF), None);
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(MsgType::GetControlModes, &[]).unwrap();
        assert_eq!(frame, vec![SYNC_BYTE, 0x03, 0x00, 0x03]);

        let frame = encode_frame(MsgType::SetPoint, &[0x10, 0xF0]).unwrap();
        assert_eq!(frame[4], 0x02u8.wrapping_add(0x02).wrapping_add(0x10).wrapping_add(0xF0));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        assert!(encode_frame(MsgType::SetPoint, &[0u8; MAX_MSG_SIZE + 1]).is_err());
    }

    #[test]
    fn test_decoder_skips_garbage_and_bad_checksum() {
        let good = encode_frame(MsgType::ControlModes, &[0x00]).unwrap();
        let mut bad = encode_frame(MsgType::ProcessValues, &[1, 2, 3]).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;

        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x00, 0x13, 0x37]);
        decoder.extend(&bad);
        decoder.extend(&good);

        let frame = decoder.next_frame().unwrap();
        assert_eq!(frame.msg_type, MsgType::ControlModes);
        assert_eq!(frame.payload, vec![0x00]);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_decoder_waits_for_split_frame() {
        let frame = encode_frame(MsgType::SetPoint, &[9, 8, 7, 6]).unwrap();
        let mut decoder = FrameDecoder::new();

        decoder.extend(&frame[..5]);
        assert!(decoder.next_frame().is_none());

        decoder.extend(&frame[5..]);
        assert_eq!(decoder.next_frame().unwrap().payload, vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_process_values_payload() {
        let state = VehicleState {
            position: Vector3::new(1.0, 2.0, 10.5),
            velocity: Vector3::new(0.5, 0.0, -0.25),
            stamp: 1_700_000_000.125,
            ..Default::default()
        };
        let payload = encode_process_values(&state);
        assert_eq!(payload.len(), PROCESS_VALUES_SIZE);

        // values chosen to be exact in f32
        assert_eq!(decode_process_values(&payload).unwrap(), state);
        assert!(decode_process_values(&payload[..10]).is_err());
    }

    #[test]
    fn test_set_point_carries_mode() {
        let mut command = ControlCommand { control_mode: "flight".into(), stamp: 2.5, ..Default::default() };
        command.set(Dof::Pitch, 0.5);

        let payload = encode_set_point(&command).unwrap();
        assert!(payload.len() <= MAX_MSG_SIZE);
        assert_eq!(decode_set_point(&payload).unwrap(), command);
    }

    #[test]
    fn test_control_modes_drop_unknown_dofs() {
        let payload = [2, 4, b'i', b'd', b'l', b'e', 0, 6, b'f', b'l', b'i', b'g', b'h', b't', 3, 4, 6, 99];
        let modes = decode_control_modes(&payload).unwrap();

        assert_eq!(modes[0], ControlMode::new("idle", Vec::<Dof>::new()));
        assert_eq!(modes[1], ControlMode::new("flight", [Dof::Pitch, Dof::Surge]));
        assert_eq!(decode_control_modes(&encode_control_modes(&modes).unwrap()).unwrap(), modes);
    }
}
