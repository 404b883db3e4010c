use byteorder::{BigEndian, WriteBytesExt};
use serde::Serialize;

use crate::error::Result;
use crate::parquet::ByteReader;

/// Per-chunk value statistics: min, max, null count, distinct count.
///
/// Min and max are raw encoded value bytes compared lexicographically;
/// both are absent until at least one non-null value is observed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Statistics {
    pub min: Option<Vec<u8>>,
    pub max: Option<Vec<u8>>,
    pub null_count: u64,
    pub distinct_count: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one non-null value into the running statistics.
    pub fn observe(&mut self, value: &[u8]) {
        match &self.min {
            Some(min) if min.as_slice() <= value => {}
            _ => self.min = Some(value.to_vec()),
        }
        match &self.max {
            Some(max) if max.as_slice() >= value => {}
            _ => self.max = Some(value.to_vec()),
        }
    }

    pub fn observe_null(&mut self) {
        self.null_count += 1;
    }

    /// Serialized layout: `[u32 min_len][min][u32 max_len][max]`
    /// `[u64 null_count][u64 distinct_count]`. An absent bound writes
    /// length 0.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        let min = self.min.as_deref().unwrap_or(&[]);
        out.write_u32::<BigEndian>(min.len() as u32)?;
        out.extend_from_slice(min);
        let max = self.max.as_deref().unwrap_or(&[]);
        out.write_u32::<BigEndian>(max.len() as u32)?;
        out.extend_from_slice(max);
        out.write_u64::<BigEndian>(self.null_count)?;
        out.write_u64::<BigEndian>(self.distinct_count)?;
        Ok(())
    }

    pub(crate) fn read_from(reader: &mut ByteReader<'_>) -> Result<Self> {
        let min = reader.read_length_prefixed("statistics min")?.to_vec();
        let max = reader.read_length_prefixed("statistics max")?.to_vec();
        let null_count = reader.read_u64("statistics null count")?;
        let distinct_count = reader.read_u64("statistics distinct count")?;
        Ok(Self {
            min: if min.is_empty() { None } else { Some(min) },
            max: if max.is_empty() { None } else { Some(max) },
            null_count,
            distinct_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_tracks_bounds() {
        let mut stats = Statistics::new();
        stats.observe(b"mango");
        stats.observe(b"apple");
        stats.observe(b"zebra");
        stats.observe_null();

        assert_eq!(stats.min.as_deref(), Some(&b"apple"[..]));
        assert_eq!(stats.max.as_deref(), Some(&b"zebra"[..]));
        assert_eq!(stats.null_count, 1);
    }

    #[test]
    fn test_layout_round_trip() {
        let mut stats = Statistics::new();
        stats.observe(b"aa");
        stats.observe(b"zz");
        stats.null_count = 4;
        stats.distinct_count = 2;

        let mut buf = Vec::new();
        stats.write_to(&mut buf).unwrap();
        let mut reader = ByteReader::new(&buf);
        let restored = Statistics::read_from(&mut reader).unwrap();
        assert_eq!(restored, stats);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_empty_statistics_round_trip() {
        let stats = Statistics::new();
        let mut buf = Vec::new();
        stats.write_to(&mut buf).unwrap();
        let restored = Statistics::read_from(&mut ByteReader::new(&buf)).unwrap();
        assert_eq!(restored.min, None);
        assert_eq!(restored.max, None);
    }
}
