//! Annex-B framing helpers: start-code scanning and NAL classification.
//!
//! Nothing here decodes slices. Backends use it to find NAL boundaries and to
//! keep the most recent SPS/PPS around for decoders that start from scratch on
//! every buffer.

use std::borrow::Cow;

use bytes::{Buf, BytesMut};

/// 4-byte start code used when re-emitting cached parameter sets.
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalKind {
    Slice,
    Idr,
    Sei,
    Sps,
    Pps,
    AccessUnitDelimiter,
    Other(u8),
}

impl NalKind {
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => Self::Slice,
            5 => Self::Idr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::AccessUnitDelimiter,
            other => Self::Other(other),
        }
    }

    pub fn is_picture(self) -> bool {
        matches!(self, Self::Slice | Self::Idr)
    }
}

/// Position of a start code in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCode {
    /// Offset of the first zero byte.
    pub offset: usize,
    /// 3 or 4.
    pub len: usize,
}

impl StartCode {
    /// Offset of the NAL header byte that follows the prefix.
    pub fn payload(&self) -> usize {
        self.offset + self.len
    }
}

/// Finds the first `00 00 01` / `00 00 00 01` prefix at or after `from`.
pub fn find_start_code(data: &[u8], from: usize) -> Option<StartCode> {
    let mut zeros = 0usize;
    for (i, &byte) in data.iter().enumerate().skip(from) {
        match byte {
            0 => zeros += 1,
            1 if zeros >= 2 => {
                let len = if zeros >= 3 { 4 } else { 3 };
                return Some(StartCode {
                    offset: i + 1 - len,
                    len,
                });
            }
            _ => zeros = 0,
        }
    }
    None
}

/// Iterator over NAL units, each yielded with its start-code prefix.
///
/// Bytes before the first start code are skipped. The last unit runs to the
/// end of the buffer and may be incomplete.
pub struct NalUnits<'a> {
    data: &'a [u8],
    next: Option<StartCode>,
}

impl<'a> Iterator for NalUnits<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = find_start_code(self.data, current.payload());
        let end = self.next.map_or(self.data.len(), |sc| sc.offset);
        Some(&self.data[current.offset..end])
    }
}

pub fn nal_units(data: &[u8]) -> NalUnits<'_> {
    NalUnits {
        data,
        next: find_start_code(data, 0),
    }
}

/// Kind of a unit produced by [`nal_units`], `None` if it is only a prefix.
pub fn nal_kind(unit: &[u8]) -> Option<NalKind> {
    let sc = find_start_code(unit, 0)?;
    unit.get(sc.payload()).copied().map(NalKind::from_header)
}

/// Follows a buffer that grows packet by packet and tells apart the units
/// already closed by a later start code from the one still arriving.
///
/// The owner of the buffer may empty it at any time. After
/// [`Self::source_cleared`] the next buffer is read from its start and the
/// unfinished unit carried over from the old one stays in front of it, so a
/// unit torn across a clear is not lost.
#[derive(Debug, Default)]
pub struct UnitAssembler {
    /// Carried tail plus every source byte since the last clear.
    window: BytesMut,
    /// Source bytes already copied into `window`.
    consumed: usize,
    /// Offset of the first start code, once one has arrived.
    head: Option<usize>,
    /// Offset of the last start code; the bytes before it are complete units.
    tail: usize,
    /// End of the bytes returned by [`Self::take_new`].
    fed: usize,
    scan_from: usize,
}

impl UnitAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies in whatever `source` gained since the previous call.
    pub fn update(&mut self, source: &[u8]) {
        if source.len() < self.consumed {
            // shrank without a call to source_cleared
            self.consumed = 0;
        }
        self.window.extend_from_slice(&source[self.consumed..]);
        self.consumed = source.len();

        let mut from = self.scan_from;
        while let Some(sc) = find_start_code(&self.window, from) {
            self.head.get_or_insert(sc.offset);
            self.tail = sc.offset;
            from = sc.payload();
        }
        // a prefix may straddle the next packet
        self.scan_from = from.max(self.window.len().saturating_sub(3));
    }

    /// Every complete unit in the window, back to back with their prefixes.
    pub fn complete(&self) -> &[u8] {
        match self.head {
            Some(head) => &self.window[head..self.tail],
            None => &[],
        }
    }

    /// Complete units not returned by an earlier call.
    pub fn take_new(&mut self) -> &[u8] {
        let Some(head) = self.head else {
            return &[];
        };
        let from = self.fed.max(head);
        self.fed = self.tail;
        &self.window[from..self.tail]
    }

    /// Complete units followed by the unit still arriving.
    pub fn as_slice(&self) -> &[u8] {
        &self.window[self.head.unwrap_or(self.window.len())..]
    }

    /// Bytes not yet closed into a complete unit.
    pub fn pending_len(&self) -> usize {
        self.window.len() - self.head.map_or(0, |_| self.tail)
    }

    /// The source was emptied after its units were used; keep only the
    /// unfinished one.
    pub fn source_cleared(&mut self) {
        let keep_from = match self.head {
            Some(_) => self.tail,
            // no unit has started, at most a split prefix is worth keeping
            None => self.window.len().saturating_sub(3),
        };
        self.window.advance(keep_from);
        self.head = self.head.map(|_| 0);
        self.tail = 0;
        self.fed = 0;
        self.consumed = 0;
        self.scan_from = self.scan_from.saturating_sub(keep_from);
    }

    /// The source was thrown away unused; forget everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Remembers the latest SPS and PPS seen on the stream.
#[derive(Debug, Default, Clone)]
pub struct ParameterSetCache {
    sps: Option<Vec<u8>>,
    pps: Option<Vec<u8>>,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records any parameter sets present in `data`. A trailing unit is only
    /// recorded once a following start code proves it complete.
    pub fn observe(&mut self, data: &[u8]) {
        let mut units = nal_units(data).peekable();
        while let Some(unit) = units.next() {
            if units.peek().is_none() {
                break;
            }
            match nal_kind(unit) {
                Some(NalKind::Sps) => self.sps = Some(normalize(unit)),
                Some(NalKind::Pps) => self.pps = Some(normalize(unit)),
                _ => {}
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.sps.is_some() && self.pps.is_some()
    }

    pub fn clear(&mut self) {
        self.sps = None;
        self.pps = None;
    }

    /// Fills in whichever of SPS and PPS `data` lacks from the cache.
    ///
    /// `data` must hold complete units only, as [`UnitAssembler::complete`]
    /// returns them. A missing SPS goes in front; a missing PPS goes right
    /// after the SPS it refers to. Borrowed when nothing is missing or the
    /// cache is not complete yet.
    pub fn prepend_if_missing<'a>(&self, data: &'a [u8]) -> Cow<'a, [u8]> {
        let (Some(sps), Some(pps)) = (&self.sps, &self.pps) else {
            return Cow::Borrowed(data);
        };
        let (mut has_sps, mut has_pps) = (false, false);
        for unit in nal_units(data) {
            match nal_kind(unit) {
                Some(NalKind::Sps) => has_sps = true,
                Some(NalKind::Pps) => has_pps = true,
                _ => {}
            }
        }

        if has_sps && has_pps {
            return Cow::Borrowed(data);
        }

        let mut out = Vec::with_capacity(sps.len() + pps.len() + data.len());
        match (has_sps, has_pps) {
            (false, has_pps) => {
                out.extend_from_slice(sps);
                if !has_pps {
                    out.extend_from_slice(pps);
                }
                out.extend_from_slice(data);
            }
            (true, _) => {
                let mut placed = false;
                for unit in nal_units(data) {
                    out.extend_from_slice(unit);
                    if !placed && nal_kind(unit) == Some(NalKind::Sps) {
                        out.extend_from_slice(pps);
                        placed = true;
                    }
                }
            }
        }
        Cow::Owned(out)
    }
}

// Rewrites the prefix to the 4-byte form so cached units concatenate cleanly.
fn normalize(unit: &[u8]) -> Vec<u8> {
    let payload = find_start_code(unit, 0).map_or(0, |sc| sc.payload());
    let mut out = Vec::with_capacity(START_CODE.len() + unit.len() - payload);
    out.extend_from_slice(&START_CODE);
    out.extend_from_slice(&unit[payload..]);
    out
}
