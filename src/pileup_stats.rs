//---------------------------------------------------------
// Copyright 2022 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use thiserror::Error;

// Phred+33 offset used by both base and mapping quality strings
const PHRED_OFFSET: u8 = 33;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("{bases} base observations but {qualities} quality values")]
    QualityLengthMismatch { bases: usize, qualities: usize },

    #[error("{qualities} base qualities but {map_qualities} mapping qualities")]
    MapQualityLengthMismatch { qualities: usize, map_qualities: usize },

    #[error("indel annotation at offset {0} is truncated")]
    TruncatedIndel(usize),

    #[error("read start marker at offset {0} has no mapping quality")]
    TruncatedReadStart(usize),

    #[error("unexpected character '{1}' at offset {0}")]
    UnexpectedCharacter(usize, char),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlleleStats
{
    pub reads: u32,
    pub reads_plus: u32,
    pub reads_minus: u32,
    sum_base_qual: u64,
    sum_map_qual: u64,
    has_map_qual: bool
}

impl AlleleStats {
    /// Number of strands (0, 1 or 2) with at least one supporting read
    pub fn strands(&self) -> u8 {
        return (self.reads_plus > 0) as u8 + (self.reads_minus > 0) as u8;
    }

    pub fn avg_base_qual(&self) -> f64 {
        if self.reads == 0 {
            return 0.0;
        }
        return self.sum_base_qual as f64 / self.reads as f64;
    }

    pub fn avg_map_qual(&self) -> f64 {
        if self.reads == 0 || !self.has_map_qual {
            return 0.0;
        }
        return self.sum_map_qual as f64 / self.reads as f64;
    }

    fn add(&mut self, obs: &Observation) -> () {
        self.reads += 1;
        if obs.reverse {
            self.reads_minus += 1;
        } else {
            self.reads_plus += 1;
        }
        self.sum_base_qual += obs.base_qual as u64;
        if let Some(mq) = obs.map_qual {
            self.sum_map_qual += mq as u64;
            self.has_map_qual = true;
        }
    }

    fn remove(&mut self, obs: &Observation) -> () {
        self.reads -= 1;
        if obs.reverse {
            self.reads_minus -= 1;
        } else {
            self.reads_plus -= 1;
        }
        self.sum_base_qual -= obs.base_qual as u64;
        if let Some(mq) = obs.map_qual {
            self.sum_map_qual -= mq as u64;
        }
    }
}

/// Per-allele read evidence at one position, in the order alleles were first observed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlleleCounts
{
    alleles: Vec<(String, AlleleStats)>
}

impl AlleleCounts {
    pub fn new() -> AlleleCounts {
        return AlleleCounts { alleles: Vec::new() };
    }

    pub fn get(&self, allele: &str) -> Option<&AlleleStats> {
        return self.alleles.iter().find(|(a, _)| a == allele).map(|(_, s)| s);
    }

    #[cfg(test)]
    pub fn reads(&self, allele: &str) -> u32 {
        return self.get(allele).map(|s| s.reads).unwrap_or(0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AlleleStats)> {
        return self.alleles.iter().map(|(a, s)| (a.as_str(), s));
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        return self.alleles.len();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        return self.alleles.is_empty();
    }

    /// Sum of reads over all alleles, i.e. the quality-passing depth
    pub fn total_reads(&self) -> u32 {
        return self.alleles.iter().map(|(_, s)| s.reads).sum();
    }

    /// Merge the evidence of another sample into this one, used for pooled calls
    pub fn merge(&mut self, other: &AlleleCounts) -> () {
        for (allele, stats) in other.iter() {
            let e = self.entry(allele);
            e.reads += stats.reads;
            e.reads_plus += stats.reads_plus;
            e.reads_minus += stats.reads_minus;
            e.sum_base_qual += stats.sum_base_qual;
            e.sum_map_qual += stats.sum_map_qual;
            e.has_map_qual |= stats.has_map_qual;
        }
    }

    fn entry(&mut self, allele: &str) -> &mut AlleleStats {
        let idx = match self.alleles.iter().position(|(a, _)| a == allele) {
            Some(i) => i,
            None => {
                self.alleles.push( (allele.to_owned(), AlleleStats::default()) );
                self.alleles.len() - 1
            }
        };
        return &mut self.alleles[idx].1;
    }

    #[cfg(test)]
    pub fn insert(&mut self, allele: &str, reads_plus: u32, reads_minus: u32, avg_base_qual: u32) -> () {
        let e = self.entry(allele);
        e.reads += reads_plus + reads_minus;
        e.reads_plus += reads_plus;
        e.reads_minus += reads_minus;
        e.sum_base_qual += ((reads_plus + reads_minus) * avg_base_qual) as u64;
    }
}

pub fn is_indel(allele: &str) -> bool {
    return allele.starts_with('+') || allele.starts_with('-');
}

// A single base call from one read, remembered so that a following indel
// annotation can take over the read's observation
#[derive(Clone)]
struct Observation
{
    allele: Option<String>,
    reverse: bool,
    base_qual: u8,
    map_qual: Option<u8>,
    passed: bool
}

fn phred(c: u8) -> u8 {
    return c.saturating_sub(PHRED_OFFSET);
}

//
// Decode a pileup base string and its quality string into per-allele statistics.
// Only observations with base quality >= min_base_qual are counted.
//
pub fn count_alleles(ref_base: char,
                     bases: &str,
                     qualities: &str,
                     min_base_qual: u8,
                     map_qualities: Option<&str>) -> Result<AlleleCounts, DecodeError>
{
    let mut counts = AlleleCounts::new();
    if bases.is_empty() {
        return Ok(counts);
    }

    let b = bases.as_bytes();
    let q = qualities.as_bytes();
    let mq = map_qualities.filter(|m| !m.is_empty()).map(|m| m.as_bytes());
    if let Some(m) = mq {
        if m.len() != q.len() {
            return Err(DecodeError::MapQualityLengthMismatch { qualities: q.len(), map_qualities: m.len() });
        }
    }

    let reference = ref_base.to_ascii_uppercase().to_string();
    let mut i = 0;
    let mut qi = 0;
    let mut last: Option<Observation> = None;

    while i < b.len() {
        let c = b[i];
        match c {
            b'^' => {
                // read start, the next character is the read's mapping quality
                if i + 1 >= b.len() {
                    return Err(DecodeError::TruncatedReadStart(i));
                }
                last = None;
                i += 2;
            }
            b'$' => {
                last = None;
                i += 1;
            }
            b'+' | b'-' => {
                let (allele, next) = parse_indel(b, i)?;
                i = next;

                // the read that reported the indel already had its base counted,
                // move that observation over to the indel allele
                if let Some(prev) = last.take() {
                    if prev.passed {
                        if let Some(base_allele) = &prev.allele {
                            counts.entry(base_allele).remove(&prev);
                        }
                        counts.entry(&allele).add(&prev);
                    }
                }
            }
            b'.' | b',' | b'A' | b'C' | b'G' | b'T' | b'N' | b'a' | b'c' | b'g' | b't' | b'n' | b'*' | b'>' | b'<' => {
                if qi >= q.len() {
                    return Err(DecodeError::QualityLengthMismatch { bases: count_base_tokens(b), qualities: q.len() });
                }

                let allele = match c {
                    b'.' | b',' => Some(reference.clone()),
                    b'*' | b'>' | b'<' => None,
                    _ => Some((c.to_ascii_uppercase() as char).to_string())
                };
                let reverse = c == b',' || c == b'<' || c.is_ascii_lowercase();

                let obs = Observation {
                    allele: allele,
                    reverse: reverse,
                    base_qual: phred(q[qi]),
                    map_qual: mq.map(|m| phred(m[qi])),
                    passed: phred(q[qi]) >= min_base_qual
                };

                if obs.passed {
                    if let Some(a) = &obs.allele {
                        counts.entry(a).add(&obs);
                    }
                }

                last = Some(obs);
                qi += 1;
                i += 1;
            }
            _ => return Err(DecodeError::UnexpectedCharacter(i, c as char))
        }
    }

    if qi != q.len() {
        return Err(DecodeError::QualityLengthMismatch { bases: qi, qualities: q.len() });
    }

    counts.alleles.retain(|(_, s)| s.reads > 0);
    return Ok(counts);
}

// Parse +<n><seq> / -<n><seq> starting at offset i, returning the allele and the next offset
fn parse_indel(b: &[u8], i: usize) -> Result<(String, usize), DecodeError> {
    let mut j = i + 1;
    let mut length: usize = 0;
    while j < b.len() && b[j].is_ascii_digit() {
        length = length * 10 + (b[j] - b'0') as usize;
        j += 1;
    }

    if j == i + 1 || length == 0 || j + length > b.len() {
        return Err(DecodeError::TruncatedIndel(i));
    }

    let seq = std::str::from_utf8(&b[j..j + length]).map_err(|_| DecodeError::TruncatedIndel(i))?;
    let allele = format!("{}{}", b[i] as char, seq.to_ascii_uppercase());
    return Ok((allele, j + length));
}

// Number of quality-consuming tokens in a base string, for error reporting
fn count_base_tokens(b: &[u8]) -> usize {
    let mut n = 0;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'^' => i += 2,
            b'$' => i += 1,
            b'+' | b'-' => {
                i = match parse_indel(b, i) {
                    Ok((_, next)) => next,
                    Err(_) => b.len()
                };
            }
            _ => {
                n += 1;
                i += 1;
            }
        }
    }
    return n;
}
