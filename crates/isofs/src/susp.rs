//! System Use Sharing Protocol framing and the Rock Ridge record set.
//! This is the largest single component of the engine.

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::types::Dual32;

/// Default POSIX modes assigned to newly-created Rock Ridge entries.
pub mod default_mode {
    pub const DIRECTORY: u32 = 0o40555;
    pub const SYMLINK: u32 = 0o120555;
    pub const REGULAR_FILE: u32 = 0o100444;
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NmFlags: u8 {
        const CONTINUE = 0b0000_0001;
        const CURRENT  = 0b0000_0010;
        const PARENT   = 0b0000_0100;
        const UNUSED3  = 0b0000_1000;
        const UNUSED4  = 0b0001_0000;
        const HOST     = 0b0010_0000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlFlags: u8 {
        const CONTINUE = 0b0000_0001;
        const CURRENT  = 0b0000_0010;
        const PARENT   = 0b0000_0100;
        const ROOT     = 0b0000_1000;
    }
}

/// A single path component of an `SL` record.
#[derive(Debug, Clone)]
pub struct SlComponent {
    pub flags: SlFlags,
    pub name: Vec<u8>,
}

impl SlComponent {
    fn encoded_len(&self) -> usize {
        2 + self.name.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.flags.bits());
        out.push(self.name.len() as u8);
        out.extend_from_slice(&self.name);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Px {
    pub file_mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
}

const PX_LEN: usize = 36;

impl Px {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"PX");
        out.push(PX_LEN as u8);
        out.push(1);
        out.extend_from_slice(&Dual32::new(self.file_mode).record());
        out.extend_from_slice(&Dual32::new(self.nlink).record());
        out.extend_from_slice(&Dual32::new(self.uid).record());
        out.extend_from_slice(&Dual32::new(self.gid).record());
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 32 {
            return Err(Error::malformed("PX record too short"));
        }
        Ok(Self {
            file_mode: Dual32::from_bytes(&payload[0..8])?.get_checked("PX.file_mode")?,
            nlink: Dual32::from_bytes(&payload[8..16])?.get_checked("PX.nlink")?,
            uid: Dual32::from_bytes(&payload[16..24])?.get_checked("PX.uid")?,
            gid: Dual32::from_bytes(&payload[24..32])?.get_checked("PX.gid")?,
        })
    }
}

impl Dual32 {
    pub(crate) fn record(&self) -> [u8; 8] {
        *bytemuck::bytes_of(self).try_into().unwrap()
    }

    pub(crate) fn from_bytes(b: &[u8]) -> Result<Self> {
        if b.len() != 8 {
            return Err(Error::malformed("dual32 field wrong length"));
        }
        Ok(*bytemuck::from_bytes(b))
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TfFlags: u8 {
        const CREATE      = 0b0000_0001;
        const MODIFY      = 0b0000_0010;
        const ACCESS      = 0b0000_0100;
        const ATTRIBUTES  = 0b0000_1000;
        const BACKUP      = 0b0001_0000;
        const EXPIRATION  = 0b0010_0000;
        const EFFECTIVE   = 0b0100_0000;
        const LONG_FORM   = 0b1000_0000;
    }
}

/// The `TF` timestamp bundle. Only the 7-byte directory-record-date form is
/// produced by the mutation API (Design Note §9 notes the 17-byte long form
/// is parse-only in this crate).
#[derive(Debug, Clone, Default)]
pub struct Tf {
    pub flags: TfFlags,
    pub timestamps: Vec<crate::date::DirDateTime>,
}

impl Tf {
    pub fn creation_default(date: crate::date::DirDateTime) -> Self {
        let flags = TfFlags::ACCESS | TfFlags::MODIFY | TfFlags::ATTRIBUTES;
        Self {
            flags,
            timestamps: vec![date, date, date],
        }
    }

    fn encoded_len(&self) -> usize {
        5 + self.timestamps.len() * 7
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let len = self.encoded_len();
        out.extend_from_slice(b"TF");
        out.push(len as u8);
        out.push(1);
        out.push(self.flags.bits());
        for ts in &self.timestamps {
            out.extend_from_slice(&ts.record());
        }
    }
}

/// `ER` extension identification record; emitted once on the root's first
/// directory record.
#[derive(Debug, Clone)]
pub struct Er {
    pub ext_id: Vec<u8>,
    pub ext_des: Vec<u8>,
    pub ext_src: Vec<u8>,
}

impl Er {
    pub fn rrip_1991a() -> Self {
        Self {
            ext_id: b"RRIP_1991A".to_vec(),
            ext_des: b"THE ROCK RIDGE INTERCHANGE PROTOCOL PROVIDES SUPPORT FOR POSIX FILE SYSTEM SEMANTICS".to_vec(),
            ext_src: b"PLEASE CONTACT DISC PUBLISHER FOR SPECIFICATION SOURCE.  SEE PUBLISHER IDENTIFIER IN PRIMARY VOLUME DESCRIPTOR FOR CONTACT INFORMATION.".to_vec(),
        }
    }

    fn encoded_len(&self) -> usize {
        8 + self.ext_id.len() + self.ext_des.len() + self.ext_src.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"ER");
        out.push(self.encoded_len() as u8);
        out.push(1);
        out.push(self.ext_id.len() as u8);
        out.push(self.ext_des.len() as u8);
        out.push(self.ext_src.len() as u8);
        out.push(1);
        out.extend_from_slice(&self.ext_id);
        out.extend_from_slice(&self.ext_des);
        out.extend_from_slice(&self.ext_src);
    }
}

/// The full Rock Ridge bundle attached to one directory record.
#[derive(Debug, Clone, Default)]
pub struct RockRidge {
    /// Emitted only on the root directory's first directory record.
    pub sp_bytes_to_skip: Option<u8>,
    /// RR bitmap record (Rock Ridge 1.09 compatibility record).
    pub rr_bitmap: Option<u8>,
    pub px: Option<Px>,
    pub tf: Option<Tf>,
    pub nm: Option<Vec<u8>>,
    pub sl: Option<Vec<SlComponent>>,
    pub cl: Option<u32>,
    pub pl: Option<u32>,
    pub re: bool,
    pub er: Option<Er>,
    pub pn: Option<(u32, u32)>,
    pub es: Option<Vec<u8>>,
    pub sf: Option<(u64, u8)>,

    /// Set by the reshuffle pass once the continuation area for this record
    /// has a home; `None` until then (or if nothing overflows).
    pub continuation_loc: Option<(u32, u32)>,
}

/// The outcome of packing a Rock Ridge bundle against a directory record's
/// remaining space.
pub struct Packed {
    pub inline: Vec<u8>,
    pub continuation: Vec<u8>,
}

pub(crate) const MAX_DR_SU: usize = 254;

/// The remaining bytes available for a directory record's System Use Area
/// once its fixed 33-byte header and (possibly odd-padded) identifier are
/// accounted for, capping the whole record at `MAX_DR_SU` bytes.
pub(crate) fn su_budget(ident_len: usize) -> usize {
    let base = 33 + ident_len + if ident_len % 2 == 0 { 1 } else { 0 };
    MAX_DR_SU.saturating_sub(base)
}

fn encode_sp(skip: u8) -> Vec<u8> {
    vec![b'S', b'P', 7, 1, 0xBE, 0xEF, skip]
}

fn encode_rr(bitmap: u8) -> Vec<u8> {
    vec![b'R', b'R', 5, 1, bitmap]
}

fn encode_pn(major: u32, minor: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(20);
    out.extend_from_slice(b"PN");
    out.push(20);
    out.push(1);
    out.extend_from_slice(&Dual32::new(major).record());
    out.extend_from_slice(&Dual32::new(minor).record());
    out
}

fn encode_cl(child: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(b"CL");
    out.push(12);
    out.push(1);
    out.extend_from_slice(&Dual32::new(child).record());
    out
}

fn encode_pl(parent: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(b"PL");
    out.push(12);
    out.push(1);
    out.extend_from_slice(&Dual32::new(parent).record());
    out
}

fn encode_re() -> Vec<u8> {
    vec![b'R', b'E', 4, 1]
}

fn encode_es(es: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + es.len());
    out.extend_from_slice(b"ES");
    out.push((4 + es.len()) as u8);
    out.push(1);
    out.extend_from_slice(es);
    out
}

fn encode_sf(size: u64, depth: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(21);
    out.extend_from_slice(b"SF");
    out.push(21);
    out.push(1);
    out.extend_from_slice(&(size as u32).to_le_bytes());
    out.extend_from_slice(&(size as u32).to_be_bytes());
    out.extend_from_slice(&((size >> 32) as u32).to_le_bytes());
    out.extend_from_slice(&((size >> 32) as u32).to_be_bytes());
    out.push(depth);
    out
}

fn encode_sl_bytes(components: &[SlComponent]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_sl(&mut out, components);
    out
}

fn encode_px(px: &Px) -> Vec<u8> {
    let mut out = Vec::with_capacity(PX_LEN);
    px.encode(&mut out);
    out
}

fn encode_tf(tf: &Tf) -> Vec<u8> {
    let mut out = Vec::with_capacity(tf.encoded_len());
    tf.encode(&mut out);
    out
}

fn encode_er(er: &Er) -> Vec<u8> {
    let mut out = Vec::with_capacity(er.encoded_len());
    er.encode(&mut out);
    out
}

/// Appends `bytes` to `inline` if doing so keeps the running total (`used`)
/// within `budget`, otherwise relocates the whole field to `continuation`.
/// Every Rock Ridge field except `NM`/`SL` is atomic: it either fits in the
/// directory record or moves to the continuation area in one piece.
fn place_atomic(bytes: Vec<u8>, budget: usize, used: &mut usize, inline: &mut Vec<u8>, continuation: &mut Vec<u8>) {
    if *used + bytes.len() <= budget {
        *used += bytes.len();
        inline.extend_from_slice(&bytes);
    } else {
        continuation.extend_from_slice(&bytes);
    }
}

/// Places `NM`, splitting the name across a local `NM` (with the `CONTINUE`
/// flag set) and a continuation `NM` when even a truncated local copy is
/// the only way to make room, mirroring the long-name handling in `pack`.
fn place_nm(name: &[u8], budget: usize, used: &mut usize, inline: &mut Vec<u8>, continuation: &mut Vec<u8>) {
    if *used + 5 + name.len() <= budget {
        encode_nm(inline, name, NmFlags::empty());
        *used += 5 + name.len();
        return;
    }
    let remaining = budget.saturating_sub(*used);
    if remaining > 5 {
        let local_len = (remaining - 5).min(name.len());
        let (local, rest) = name.split_at(local_len);
        encode_nm(inline, local, NmFlags::CONTINUE);
        *used += 5 + local.len();
        if !rest.is_empty() {
            encode_nm(continuation, rest, NmFlags::empty());
        }
    } else {
        encode_nm(continuation, name, NmFlags::empty());
    }
}

impl RockRidge {
    fn fixed_len(&self) -> usize {
        let mut len = 0;
        if self.sp_bytes_to_skip.is_some() {
            len += 7;
        }
        if self.rr_bitmap.is_some() {
            len += 5;
        }
        if let Some(px) = &self.px {
            let _ = px;
            len += PX_LEN;
        }
        if let Some(tf) = &self.tf {
            len += tf.encoded_len();
        }
        if self.pn.is_some() {
            len += 20;
        }
        if self.cl.is_some() {
            len += 12;
        }
        if self.pl.is_some() {
            len += 12;
        }
        if self.re {
            len += 4;
        }
        if let Some(er) = &self.er {
            len += er.encoded_len();
        }
        if let Some(es) = &self.es {
            len += 4 + es.len();
        }
        if self.sf.is_some() {
            len += 21;
        }
        len
    }

    fn nm_full_len(&self) -> usize {
        self.nm.as_ref().map(|n| 5 + n.len()).unwrap_or(0)
    }

    fn sl_full_len(&self) -> usize {
        match &self.sl {
            None => 0,
            Some(comps) => 5 + comps.iter().map(SlComponent::encoded_len).sum::<usize>(),
        }
    }

    /// Inline length this bundle would occupy given `budget` bytes available
    /// in the owning directory record's system-use area.
    pub fn inline_len(&self) -> usize {
        self.pack(MAX_DR_SU).inline.len()
    }

    /// Packs the bundle against `budget` bytes of directory-record system-use
    /// space. If every field fits, everything stays inline in the
    /// conventional SP/RR/PX/TF/PN/CL/PL/RE/ER/ES/SF/NM/SL order and no `CE`
    /// is emitted. Otherwise a `CE` pointer is reserved up front and each
    /// field, in turn, is placed inline if there is still room or relocated
    /// whole to the continuation area if not — `NM` and `SL` are the only
    /// fields allowed to split across the two. This is the same
    /// field-by-field relocation `RockRidge.new()` performs in the source
    /// this crate was distilled from, generalized to every SUSP field
    /// instead of just the ones the creation path itself produces (so that a
    /// record carrying a parsed PN/ES/SF/etc. that happens to overflow is
    /// still packed correctly on write-back).
    pub fn pack(&self, budget: usize) -> Packed {
        let full = self.fixed_len() + self.nm_full_len() + self.sl_full_len();

        let mut inline = Vec::new();
        let mut continuation = Vec::new();

        if full <= budget {
            if let Some(skip) = self.sp_bytes_to_skip {
                inline.extend_from_slice(&encode_sp(skip));
            }
            if let Some(bitmap) = self.rr_bitmap {
                inline.extend_from_slice(&encode_rr(bitmap));
            }
            if let Some(px) = &self.px {
                inline.extend_from_slice(&encode_px(px));
            }
            if let Some(tf) = &self.tf {
                inline.extend_from_slice(&encode_tf(tf));
            }
            if let Some((major, minor)) = self.pn {
                inline.extend_from_slice(&encode_pn(major, minor));
            }
            if let Some(child) = self.cl {
                inline.extend_from_slice(&encode_cl(child));
            }
            if let Some(parent) = self.pl {
                inline.extend_from_slice(&encode_pl(parent));
            }
            if self.re {
                inline.extend_from_slice(&encode_re());
            }
            if let Some(er) = &self.er {
                inline.extend_from_slice(&encode_er(er));
            }
            if let Some(es) = &self.es {
                inline.extend_from_slice(&encode_es(es));
            }
            if let Some((size, depth)) = self.sf {
                inline.extend_from_slice(&encode_sf(size, depth));
            }
            if let Some(nm) = &self.nm {
                encode_nm(&mut inline, nm, NmFlags::empty());
            }
            if let Some(sl) = &self.sl {
                encode_sl(&mut inline, sl);
            }
            return Packed {
                inline,
                continuation,
            };
        }

        // Overflow: reserve the CE pointer's 28 bytes against the budget
        // before placing anything else, then walk every field in turn,
        // keeping each inline while there's still room and relocating it
        // whole (or, for NM/SL, split) to the continuation area once there
        // isn't.
        let mut used = 28usize;

        if let Some(skip) = self.sp_bytes_to_skip {
            place_atomic(encode_sp(skip), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(bitmap) = self.rr_bitmap {
            place_atomic(encode_rr(bitmap), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(nm) = &self.nm {
            place_nm(nm, budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(px) = &self.px {
            place_atomic(encode_px(px), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(sl) = &self.sl {
            place_atomic(encode_sl_bytes(sl), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(tf) = &self.tf {
            place_atomic(encode_tf(tf), budget, &mut used, &mut inline, &mut continuation);
        }

        // The CE pointer always stays inline, at the budget it reserved;
        // its extent/offset/length are patched in once reshuffle has
        // assigned the continuation area a home.
        inline.extend_from_slice(b"CE");
        inline.push(28);
        inline.push(1);
        inline.extend_from_slice(&Dual32::new(0).record());
        inline.extend_from_slice(&Dual32::new(0).record());
        inline.extend_from_slice(&Dual32::new(0).record());

        if let Some(er) = &self.er {
            place_atomic(encode_er(er), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some((major, minor)) = self.pn {
            place_atomic(encode_pn(major, minor), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(child) = self.cl {
            place_atomic(encode_cl(child), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(parent) = self.pl {
            place_atomic(encode_pl(parent), budget, &mut used, &mut inline, &mut continuation);
        }
        if self.re {
            place_atomic(encode_re(), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some(es) = &self.es {
            place_atomic(encode_es(es), budget, &mut used, &mut inline, &mut continuation);
        }
        if let Some((size, depth)) = self.sf {
            place_atomic(encode_sf(size, depth), budget, &mut used, &mut inline, &mut continuation);
        }

        Packed {
            inline,
            continuation,
        }
    }
}

impl Tf {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::malformed("TF record empty"));
        }
        let flags = TfFlags::from_bits_truncate(payload[0]);
        let long_form = flags.contains(TfFlags::LONG_FORM);
        let per = if long_form { 17 } else { 7 };
        let count = (flags.bits() & 0x7f).count_ones() as usize;
        let rest = &payload[1..];
        if rest.len() < count * per {
            return Err(Error::malformed("TF record truncated"));
        }
        let mut timestamps = Vec::with_capacity(count);
        for i in 0..count {
            let chunk = &rest[i * per..(i + 1) * per];
            if long_form {
                timestamps.push(long_date_to_dir(chunk));
            } else {
                let arr: [u8; 7] = chunk.try_into().unwrap();
                timestamps.push(crate::date::DirDateTime::parse(arr));
            }
        }
        Ok(Self { flags, timestamps })
    }
}

/// Converts a 17-byte Volume-Descriptor-Date `TF` entry to the crate's
/// 7-byte directory-record form. The long form is parse-only (Design
/// Note §9); this loses hundredths-of-a-second precision, which nothing in
/// this crate's own `TF` production ever carries anyway.
fn long_date_to_dir(bytes: &[u8]) -> crate::date::DirDateTime {
    fn digits(b: &[u8]) -> u32 {
        core::str::from_utf8(b)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
    let year = digits(&bytes[0..4]);
    crate::date::DirDateTime {
        years_since_1900: year.saturating_sub(1900) as u8,
        month: digits(&bytes[4..6]) as u8,
        day: digits(&bytes[6..8]) as u8,
        hour: digits(&bytes[8..10]) as u8,
        minute: digits(&bytes[10..12]) as u8,
        second: digits(&bytes[12..14]) as u8,
        offset: bytes[16] as i8,
    }
}

impl Er {
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 4 {
            return Err(Error::malformed("ER record too short"));
        }
        let id_len = payload[0] as usize;
        let des_len = payload[1] as usize;
        let src_len = payload[2] as usize;
        let rest = &payload[4..];
        if rest.len() < id_len + des_len + src_len {
            return Err(Error::malformed("ER record truncated"));
        }
        Ok(Self {
            ext_id: rest[..id_len].to_vec(),
            ext_des: rest[id_len..id_len + des_len].to_vec(),
            ext_src: rest[id_len + des_len..id_len + des_len + src_len].to_vec(),
        })
    }
}

fn decode_sl_components(payload: &[u8]) -> Result<Vec<SlComponent>> {
    if payload.is_empty() {
        return Err(Error::malformed("SL record empty"));
    }
    let mut data = &payload[1..];
    let mut out = Vec::new();
    while data.len() >= 2 {
        let flags = SlFlags::from_bits_truncate(data[0]);
        let len = data[1] as usize;
        if data.len() < 2 + len {
            return Err(Error::malformed("SL component truncated"));
        }
        out.push(SlComponent {
            flags,
            name: data[2..2 + len].to_vec(),
        });
        data = &data[2 + len..];
    }
    Ok(out)
}

/// Parses one SUSP byte stream (a directory record's system-use area, or a
/// continuation area) into `rr`, returning the `CE` pointer if one was seen.
/// Call this once for the inline area, then again for each continuation
/// area the returned `CE` points at.
fn parse_into(rr: &mut RockRidge, mut data: &[u8]) -> Result<Option<(u32, u32, u32)>> {
    let mut ce = None;
    while data.len() >= 4 {
        if data.iter().all(|&b| b == 0) {
            break;
        }
        let tag = [data[0], data[1]];
        let len = data[2] as usize;
        if len < 4 || len > data.len() {
            return Err(Error::malformed("SUSP record length out of range"));
        }
        let version = data[3];
        if version != 1 {
            return Err(Error::malformed("SUSP record entry version must be 1"));
        }
        let payload = &data[4..len];
        match &tag {
            b"SP" => {
                if payload.len() < 3 || payload[0] != 0xBE || payload[1] != 0xEF {
                    return Err(Error::malformed("SP record has bad check bytes"));
                }
                rr.sp_bytes_to_skip = Some(payload[2]);
            }
            b"RR" => {
                if payload.is_empty() {
                    return Err(Error::malformed("RR record empty"));
                }
                rr.rr_bitmap = Some(payload[0]);
            }
            b"CE" => {
                if payload.len() < 24 {
                    return Err(Error::malformed("CE record too short"));
                }
                let extent = Dual32::from_bytes(&payload[0..8])?.get_checked("RockRidge.CE.extent")?;
                let offset = Dual32::from_bytes(&payload[8..16])?.get_checked("RockRidge.CE.offset")?;
                let length = Dual32::from_bytes(&payload[16..24])?.get_checked("RockRidge.CE.length")?;
                ce = Some((extent, offset, length));
            }
            b"PX" => rr.px = Some(Px::decode(payload)?),
            b"TF" => rr.tf = Some(Tf::decode(payload)?),
            b"PN" => {
                if payload.len() < 16 {
                    return Err(Error::malformed("PN record too short"));
                }
                let major = Dual32::from_bytes(&payload[0..8])?.get_checked("RockRidge.PN.major")?;
                let minor = Dual32::from_bytes(&payload[8..16])?.get_checked("RockRidge.PN.minor")?;
                rr.pn = Some((major, minor));
            }
            b"SL" => {
                let mut components = decode_sl_components(payload)?;
                match &mut rr.sl {
                    Some(existing) => existing.append(&mut components),
                    None => rr.sl = Some(components),
                }
            }
            b"NM" => {
                if payload.is_empty() {
                    return Err(Error::malformed("NM record empty"));
                }
                rr.nm.get_or_insert_with(Vec::new).extend_from_slice(&payload[1..]);
            }
            b"CL" => rr.cl = Some(Dual32::from_bytes(payload)?.get_checked("RockRidge.CL")?),
            b"PL" => rr.pl = Some(Dual32::from_bytes(payload)?.get_checked("RockRidge.PL")?),
            b"RE" => rr.re = true,
            b"ER" => rr.er = Some(Er::decode(payload)?),
            b"ES" => rr.es = Some(payload.to_vec()),
            b"SF" => {
                if payload.len() < 17 {
                    return Err(Error::malformed("SF record too short"));
                }
                let lo = u32::from_le_bytes(payload[0..4].try_into().unwrap());
                let hi = u32::from_le_bytes(payload[8..12].try_into().unwrap());
                let size = (lo as u64) | ((hi as u64) << 32);
                rr.sf = Some((size, payload[16]));
            }
            other => {
                if !is_known_tag(*other) {
                    return Err(Error::malformed("unknown SUSP tag"));
                }
            }
        }
        data = &data[len..];
    }
    Ok(ce)
}

impl Packed {
    /// Patches the inline `CE` pointer (if present) to reference `extent`
    /// at `offset` within it (`length` bytes), once the reshuffle pass has
    /// assigned the continuation area's (extent, offset) slot.
    pub fn patch_ce(&mut self, extent: u32, offset: u32, length: u32) {
        if let Some(pos) = self.inline.windows(2).position(|w| w == b"CE") {
            let payload = pos + 4;
            self.inline[payload..payload + 8].copy_from_slice(&Dual32::new(extent).record());
            self.inline[payload + 8..payload + 16].copy_from_slice(&Dual32::new(offset).record());
            self.inline[payload + 16..payload + 24].copy_from_slice(&Dual32::new(length).record());
        }
    }
}

impl RockRidge {
    /// Parses a fresh bundle out of a directory record's system-use area,
    /// returning the `CE` pointer (if any) for the caller to follow.
    pub fn parse(system_use: &[u8]) -> Result<(Self, Option<(u32, u32, u32)>)> {
        let mut rr = Self::default();
        let ce = parse_into(&mut rr, system_use)?;
        Ok((rr, ce))
    }

    /// Merges a continuation area's records into an already-parsed bundle.
    /// A continuation may itself chain to another `CE`.
    pub fn merge_continuation(&mut self, bytes: &[u8]) -> Result<Option<(u32, u32, u32)>> {
        parse_into(self, bytes)
    }
}

fn encode_nm(out: &mut Vec<u8>, name: &[u8], flags: NmFlags) {
    out.extend_from_slice(b"NM");
    out.push((5 + name.len()) as u8);
    out.push(1);
    out.push(flags.bits());
    out.extend_from_slice(name);
}

fn encode_sl(out: &mut Vec<u8>, components: &[SlComponent]) {
    out.extend_from_slice(b"SL");
    out.push((5 + components.iter().map(SlComponent::encoded_len).sum::<usize>()) as u8);
    out.push(1);
    out.push(0); // flags: not continued from a prior SL record
    for c in components {
        c.encode(out);
    }
}

/// Known two-letter SUSP tags, used by the parser to detect Rock Ridge on
/// first encounter.
pub const KNOWN_TAGS: &[[u8; 2]] = &[
    *b"SP", *b"RR", *b"CE", *b"PX", *b"ER", *b"ES", *b"PN", *b"SL", *b"NM", *b"CL", *b"PL", *b"RE",
    *b"TF", *b"SF",
];

pub fn is_known_tag(tag: [u8; 2]) -> bool {
    KNOWN_TAGS.contains(&tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::DirDateTime;

    fn sample_bundle(name_len: usize) -> RockRidge {
        RockRidge {
            rr_bitmap: Some(0x09),
            px: Some(Px {
                file_mode: default_mode::REGULAR_FILE,
                nlink: 1,
                uid: 0,
                gid: 0,
            }),
            tf: Some(Tf::creation_default(DirDateTime::default())),
            nm: Some(vec![b'a'; name_len]),
            ..Default::default()
        }
    }

    #[test]
    fn short_name_stays_inline() {
        let rr = sample_bundle(8);
        let packed = rr.pack(200);
        assert!(packed.continuation.is_empty());
        assert!(!packed.inline.is_empty());
    }

    #[test]
    fn long_name_splits_to_continuation() {
        let rr = sample_bundle(200);
        let packed = rr.pack(120);
        assert!(!packed.continuation.is_empty());
        // The inline buffer must contain a CE record.
        assert!(packed.inline.windows(2).any(|w| w == b"CE"));
        // And a local NM with the CONTINUE bit set.
        let nm_pos = packed
            .inline
            .windows(2)
            .position(|w| w == b"NM")
            .expect("inline NM present");
        assert_eq!(packed.inline[nm_pos + 3] & NmFlags::CONTINUE.bits(), 1);
    }

    #[test]
    fn px_roundtrips() {
        let px = Px {
            file_mode: default_mode::DIRECTORY,
            nlink: 3,
            uid: 1000,
            gid: 1000,
        };
        let mut bytes = Vec::new();
        px.encode(&mut bytes);
        let decoded = Px::decode(&bytes[4..]).unwrap();
        assert_eq!(decoded.file_mode, px.file_mode);
        assert_eq!(decoded.nlink, 3);
    }
}
