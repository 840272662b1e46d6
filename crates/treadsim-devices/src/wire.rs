use bytemuck::{Pod, Zeroable};

use crate::DeviceError;

pub const MAGIC: u32 = 0x5344_5354; // "TSDS"
pub const VER: u16 = 1;
/// Engine -> controller: current feedback of every device.
pub const KIND_STATE: u8 = 1;
/// Controller -> engine: velocity commands.
pub const KIND_COMMAND: u8 = 2;

pub const NAME_LEN: usize = 32;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct FrameHdr {
    pub magic: u32,
    pub ver: u16,
    pub kind: u8,
    pub flags: u8,
    pub tick: u64,
    pub count: u32,
    pub payload_len: u32,
}

/// Device name (UTF-8, zero padded) and value.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireEntry {
    pub name: [u8; NAME_LEN],
    pub value: f32,
}

const HDR_SZ: usize = core::mem::size_of::<FrameHdr>();
const ENT_SZ: usize = core::mem::size_of::<WireEntry>();

/// Decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub kind: u8,
    pub tick: u64,
    pub entries: Vec<(String, f32)>,
}

fn encode_name(name: &str) -> Result<[u8; NAME_LEN], DeviceError> {
    let b = name.as_bytes();
    if b.len() > NAME_LEN {
        return Err(DeviceError::Wire(format!("device name `{name}` exceeds {NAME_LEN} bytes")));
    }
    if b.contains(&0) {
        return Err(DeviceError::Wire(format!("device name `{name}` contains NUL")));
    }
    let mut out = [0u8; NAME_LEN];
    out[..b.len()].copy_from_slice(b);
    Ok(out)
}

fn decode_name(raw: &[u8; NAME_LEN]) -> Result<String, DeviceError> {
    let end = raw.iter().position(|&c| c == 0).unwrap_or(NAME_LEN);
    std::str::from_utf8(&raw[..end])
        .map(str::to_owned)
        .map_err(|_| DeviceError::Wire("device name is not UTF-8".into()))
}

pub fn encode_frame<'a, I>(kind: u8, tick: u64, entries: I) -> Result<Vec<u8>, DeviceError>
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let mut ents = Vec::new();
    for (name, value) in entries {
        ents.push(WireEntry { name: encode_name(name)?, value });
    }
    let payload_len = (ents.len() * ENT_SZ) as u32;
    let hdr = FrameHdr { magic: MAGIC, ver: VER, kind, flags: 0, tick, count: ents.len() as u32, payload_len };
    let mut buf = Vec::with_capacity(HDR_SZ + payload_len as usize);
    buf.extend_from_slice(bytemuck::bytes_of(&hdr));
    buf.extend_from_slice(bytemuck::cast_slice(&ents));
    Ok(buf)
}

/// Validate and decode. Buffers carry no alignment guarantee, so every record is
/// read unaligned.
pub fn decode_frame(buf: &[u8]) -> Result<Frame, DeviceError> {
    if buf.len() < HDR_SZ {
        return Err(DeviceError::Wire(format!("short frame: {} bytes", buf.len())));
    }
    let (hbytes, pbytes) = buf.split_at(HDR_SZ);
    let hdr: FrameHdr = bytemuck::pod_read_unaligned(hbytes);
    if hdr.magic != MAGIC { return Err(DeviceError::Wire("bad magic".into())); }
    if hdr.ver != VER { return Err(DeviceError::Wire(format!("unsupported version {}", hdr.ver))); }
    if hdr.kind != KIND_STATE && hdr.kind != KIND_COMMAND {
        return Err(DeviceError::Wire(format!("unknown frame kind {}", hdr.kind)));
    }
    if hdr.payload_len as usize != pbytes.len() || hdr.count as usize * ENT_SZ != pbytes.len() {
        return Err(DeviceError::Wire("payload length mismatch".into()));
    }
    let mut entries = Vec::with_capacity(hdr.count as usize);
    for chunk in pbytes.chunks_exact(ENT_SZ) {
        let e: WireEntry = bytemuck::pod_read_unaligned(chunk);
        entries.push((decode_name(&e.name)?, e.value));
    }
    Ok(Frame { kind: hdr.kind, tick: hdr.tick, entries })
}
