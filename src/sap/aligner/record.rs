//! The per-read alignment record (spec §4.G step 4, §6): one line per
//! accepted cluster, tab-separated.

use std::fmt;

/// Which strand a record aligned against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    ReverseComplement,
}

impl Direction {
    #[inline]
    pub fn as_char(self) -> char {
        match self {
            Direction::Forward => 'N',
            Direction::ReverseComplement => 'R',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Direction::Forward),
            'R' => Some(Direction::ReverseComplement),
            _ => None,
        }
    }
}

/// One operation in an alignment trace (spec GLOSSARY: opstring).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Match.
    Match,
    /// Substitution.
    Subst,
    /// Insertion relative to the reference (consumes read only).
    Ins,
    /// Deletion from the reference (consumes reference only).
    Del,
}

impl Op {
    #[inline]
    pub fn as_char(self) -> char {
        match self {
            Op::Match => 'n',
            Op::Subst => 'c',
            Op::Ins => 'i',
            Op::Del => 'd',
        }
    }

    pub fn from_char(c: u8) -> Option<Self> {
        match c {
            b'n' => Some(Op::Match),
            b'c' => Some(Op::Subst),
            b'i' => Some(Op::Ins),
            b'd' => Some(Op::Del),
            _ => None,
        }
    }

    #[inline]
    pub fn consumes_read(self) -> bool {
        matches!(self, Op::Match | Op::Subst | Op::Ins)
    }

    #[inline]
    pub fn consumes_ref(self) -> bool {
        matches!(self, Op::Match | Op::Subst | Op::Del)
    }
}

/// An opstring: a compressed alignment trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpString(pub Vec<Op>);

impl OpString {
    pub fn push(&mut self, op: Op) {
        self.0.push(op);
    }

    pub fn read_span(&self) -> usize {
        self.0.iter().filter(|op| op.consumes_read()).count()
    }

    pub fn ref_span(&self) -> usize {
        self.0.iter().filter(|op| op.consumes_ref()).count()
    }
}

impl fmt::Display for OpString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for op in &self.0 {
            write!(f, "{}", op.as_char())?;
        }
        Ok(())
    }
}

impl std::str::FromStr for OpString {
    type Err = InvalidOpChar;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ops = Vec::with_capacity(s.len());
        for &b in s.as_bytes() {
            ops.push(Op::from_char(b).ok_or(InvalidOpChar(b as char))?);
        }
        Ok(OpString(ops))
    }
}

#[derive(Debug)]
pub struct InvalidOpChar(pub char);

impl fmt::Display for InvalidOpChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid opstring character: {:?}", self.0)
    }
}

impl std::error::Error for InvalidOpChar {}

/// One accepted alignment between a read and a reference cluster (spec
/// §3/§4.G step 4).
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub ref_name: String,
    pub direction: Direction,
    pub read_start: usize,
    pub ref_start: usize,
    /// Clipped to `[0, 1]`; see [`crate::sap::aligner::clip_score`].
    pub score: f64,
    pub ops: OpString,
}

impl fmt::Display for AlignmentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{:.4}\t{}",
            self.ref_name,
            self.direction.as_char(),
            self.read_start,
            self.ref_start,
            self.score,
            self.ops
        )
    }
}

/// Parses one tab-separated alignment-record line (spec §6).
pub fn parse_record(line: &str) -> Option<AlignmentRecord> {
    let mut fields = line.split('\t');
    let ref_name = fields.next()?.to_string();
    let direction = Direction::from_char(fields.next()?.chars().next()?)?;
    let read_start = fields.next()?.parse().ok()?;
    let ref_start = fields.next()?.parse().ok()?;
    let score = fields.next()?.parse().ok()?;
    let ops: OpString = fields.next()?.parse().ok()?;

    Some(AlignmentRecord {
        ref_name,
        direction,
        read_start,
        ref_start,
        score,
        ops,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn record_round_trips_through_display_and_parse() {
        let record = AlignmentRecord {
            ref_name: "ref1".into(),
            direction: Direction::ReverseComplement,
            read_start: 3,
            ref_start: 7,
            score: 0.91234,
            ops: "nnccidd".parse().unwrap(),
        };

        let line = record.to_string();
        let parsed = parse_record(&line).unwrap();

        assert_eq!(parsed.ref_name, "ref1");
        assert_eq!(parsed.direction, Direction::ReverseComplement);
        assert_eq!(parsed.read_start, 3);
        assert_eq!(parsed.ref_start, 7);
        assert!((parsed.score - 0.9123).abs() < 1e-9);
        assert_eq!(parsed.ops.0.len(), 7);
    }

    #[test]
    fn op_span_counts_match_spec_invariant_5() {
        let ops: OpString = "nncidnn".parse().unwrap();
        // n,n,c,i,d,n,n -> read-consuming: n,n,c,i,n,n = 6; ref-consuming: n,n,c,d,n,n = 6
        assert_eq!(ops.read_span(), 6);
        assert_eq!(ops.ref_span(), 6);
    }
}
