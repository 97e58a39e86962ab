//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use log::warn;
use crate::errors::{Result, VarcallError};
use crate::pileup_stats::{count_alleles, AlleleCounts};

// The bases, qualities and depth reported for one sample at one position
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleEvidence
{
    pub depth: u32,
    pub bases: String,
    pub qualities: String,
    pub map_qualities: Option<String>
}

impl SampleEvidence {
    fn parse(line_number: u64, depth: &str, bases: Option<&str>, qualities: Option<&str>) -> Result<SampleEvidence> {
        let depth: u32 = depth.trim().parse()
            .map_err(|_| VarcallError::malformed(line_number, format!("invalid depth '{}'", depth)))?;
        let bases = bases.unwrap_or("");
        let qualities = qualities.unwrap_or("");

        // samtools writes '*' for both strings at uncovered positions
        if depth == 0 || (bases == "*" && qualities == "*") {
            return Ok(SampleEvidence { depth: depth, ..Default::default() });
        }

        if bases.is_empty() || qualities.is_empty() {
            return Err(VarcallError::malformed(line_number, "missing bases or qualities"));
        }

        return Ok(SampleEvidence {
            depth: depth,
            bases: bases.to_owned(),
            qualities: qualities.to_owned(),
            map_qualities: None
        });
    }

    // Number of bases with quality at least min_qual
    pub fn quality_depth(&self, min_qual: u8) -> u32 {
        return self.qualities.bytes().filter(|&q| q.saturating_sub(33) >= min_qual).count() as u32;
    }

    pub fn allele_counts(&self, ref_base: char, min_base_qual: u8, line_number: u64) -> Result<AlleleCounts> {
        return count_alleles(ref_base, &self.bases, &self.qualities, min_base_qual, self.map_qualities.as_deref())
            .map_err(|e| VarcallError::malformed(line_number, e.to_string()));
    }
}

// Single-sample pileup record
#[derive(Clone, Debug, PartialEq)]
pub struct PileupRow
{
    pub chrom: String,
    pub position: u64,
    pub ref_base: char,
    pub sample: SampleEvidence
}

fn parse_site(line_number: u64, fields: &[&str]) -> Result<(String, u64, char)> {
    if fields.len() < 3 || fields[0].is_empty() {
        return Err(VarcallError::malformed(line_number, "too few columns"));
    }

    let position: u64 = fields[1].parse()
        .map_err(|_| VarcallError::malformed(line_number, format!("invalid position '{}'", fields[1])))?;

    let mut ref_chars = fields[2].chars();
    let ref_base = match (ref_chars.next(), ref_chars.next()) {
        (Some(c), None) => c.to_ascii_uppercase(),
        _ => return Err(VarcallError::malformed(line_number, format!("invalid reference base '{}'", fields[2])))
    };
    return Ok((fields[0].to_owned(), position, ref_base));
}

impl PileupRow {
    pub fn parse(line: &str, line_number: u64) -> Result<PileupRow> {
        let fields: Vec<&str> = line.trim_end_matches(|c: char| c == '\n' || c == '\r').split('\t').collect();
        if fields.len() < 4 || fields.len() > 7 {
            return Err(VarcallError::malformed(line_number, format!("expected 6 or 7 columns, found {}", fields.len())));
        }

        let (chrom, position, ref_base) = parse_site(line_number, &fields)?;
        let mut sample = SampleEvidence::parse(line_number, fields[3], fields.get(4).copied(), fields.get(5).copied())?;
        if sample.depth > 0 && fields.len() < 6 {
            return Err(VarcallError::malformed(line_number, "missing bases or qualities"));
        }
        if let Some(mq) = fields.get(6) {
            if !sample.bases.is_empty() {
                sample.map_qualities = Some(mq.to_string());
            }
        }

        return Ok(PileupRow { chrom: chrom, position: position, ref_base: ref_base, sample: sample });
    }
}

// Multi-sample pileup record, three columns per sample
#[derive(Clone, Debug, PartialEq)]
pub struct MpileupRow
{
    pub chrom: String,
    pub position: u64,
    pub ref_base: char,
    pub samples: Vec<SampleEvidence>
}

impl MpileupRow {
    pub fn parse(line: &str, line_number: u64) -> Result<MpileupRow> {
        let fields: Vec<&str> = line.trim_end_matches(|c: char| c == '\n' || c == '\r').split('\t').collect();
        if fields.len() < 6 || (fields.len() - 3) % 3 != 0 {
            return Err(VarcallError::malformed(line_number, format!("expected 3 + 3 * samples columns, found {}", fields.len())));
        }

        let (chrom, position, ref_base) = parse_site(line_number, &fields)?;
        let mut samples = Vec::new();
        for s in fields[3..].chunks(3) {
            samples.push(SampleEvidence::parse(line_number, s[0], Some(s[1]), Some(s[2]))?);
        }

        return Ok(MpileupRow { chrom: chrom, position: position, ref_base: ref_base, samples: samples });
    }
}

//
// Tracks malformed input lines. Each bad line is logged and skipped until
// the limit is reached, at which point the run is aborted.
//
pub struct MalformedBudget
{
    count: usize,
    limit: usize
}

impl MalformedBudget {
    pub fn new(limit: usize) -> MalformedBudget {
        return MalformedBudget { count: 0, limit: limit };
    }

    pub fn count(&self) -> usize {
        return self.count;
    }

    // Returns Ok if the line may be skipped, the error to abort with otherwise
    pub fn record(& mut self, error: VarcallError) -> Result<()> {
        match error {
            VarcallError::MalformedRecord { line, reason } => {
                self.count += 1;
                warn!("skipping malformed pileup line {}: {}", line, reason);
                if self.count >= self.limit {
                    return Err(VarcallError::TooManyMalformedRecords { count: self.count });
                }
                return Ok(());
            }
            other => return Err(other)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pileup() {
        let row = PileupRow::parse("chr1\t100\ta\t3\t.,G\tIII", 1).unwrap();
        assert_eq!(row.chrom, "chr1");
        assert_eq!(row.position, 100);
        assert_eq!(row.ref_base, 'A');
        assert_eq!(row.sample.depth, 3);
        assert_eq!(row.sample.map_qualities, None);

        let row = PileupRow::parse("chr1\t100\tA\t2\t..\tII\t<<\n", 1).unwrap();
        assert_eq!(row.sample.map_qualities.as_deref(), Some("<<"));
        let counts = row.sample.allele_counts(row.ref_base, 15, 1).unwrap();
        assert_eq!(counts.reads("A"), 2);
    }

    #[test]
    fn test_parse_zero_depth() {
        let row = PileupRow::parse("chr1\t100\tA\t0", 7).unwrap();
        assert_eq!(row.sample.depth, 0);
        assert!(row.sample.bases.is_empty());

        let row = PileupRow::parse("chr1\t100\tA\t0\t*\t*", 7).unwrap();
        assert!(row.sample.allele_counts('A', 15, 7).unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        for line in ["chr1\t100", "chr1\tx\tA\t1\t.\tI", "chr1\t100\tAC\t1\t.\tI", "chr1\t100\tA\t1\t\t"] {
            match PileupRow::parse(line, 3) {
                Err(VarcallError::MalformedRecord { line, .. }) => assert_eq!(line, 3),
                other => panic!("unexpected result {:?}", other)
            }
        }

        let row = PileupRow::parse("chr1\t100\tA\t2\t..\tI", 4).unwrap();
        assert!(row.sample.allele_counts('A', 0, 4).is_err());
    }

    #[test]
    fn test_parse_mpileup() {
        let row = MpileupRow::parse("chr2\t5\tC\t2\t.T\tII\t0\t*\t*\t1\t,\t5", 1).unwrap();
        assert_eq!(row.samples.len(), 3);
        assert_eq!(row.samples[0].depth, 2);
        assert_eq!(row.samples[1].depth, 0);
        assert_eq!(row.samples[2].bases, ",");
        assert!(MpileupRow::parse("chr2\t5\tC\t2\t.T", 1).is_err());
    }

    #[test]
    fn test_quality_depth() {
        let row = PileupRow::parse("chr1\t1\tA\t4\t....\tI#5+", 1).unwrap();
        // I=40, #=2, 5=20, +=10
        assert_eq!(row.sample.quality_depth(15), 2);
        assert_eq!(row.sample.quality_depth(0), 4);
    }

    #[test]
    fn test_malformed_budget() {
        let mut budget = MalformedBudget::new(5);
        for i in 0..4 {
            assert!(budget.record(VarcallError::malformed(i, "bad")).is_ok());
        }
        match budget.record(VarcallError::malformed(5, "bad")) {
            Err(VarcallError::TooManyMalformedRecords { count }) => assert_eq!(count, 5),
            other => panic!("unexpected result {:?}", other)
        }
        assert_eq!(budget.count(), 5);
    }
}
