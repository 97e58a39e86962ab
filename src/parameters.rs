//---------------------------------------------------------
// Copyright 2022 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::cmp::Ordering;
use crate::errors::{Result, VarcallError};

// Parameters for the genotype and somatic calling models
#[derive(Clone, Debug, PartialEq)]
pub struct CallingParameters {
    pub min_coverage: u32,
    pub min_coverage_normal: u32,
    pub min_coverage_tumor: u32,
    pub min_reads2: u32,
    pub min_avg_qual: u8,
    pub min_var_freq: f64,
    pub min_freq_for_hom: f64,
    pub p_value: f64,
    pub somatic_p_value: f64,
    pub normal_purity: f64,
    pub tumor_purity: f64,
    pub strand_filter: bool
}

impl CallingParameters {
    pub fn defaults() -> CallingParameters {
        CallingParameters {
            min_coverage: 8,
            min_coverage_normal: 8,
            min_coverage_tumor: 6,
            min_reads2: 2,
            min_avg_qual: 15,
            min_var_freq: 0.10,
            min_freq_for_hom: 0.75,
            p_value: 0.99,
            somatic_p_value: 0.05,
            normal_purity: 1.0,
            tumor_purity: 1.0,
            strand_filter: false
        }
    }

    // somatic runs require more variant support in the tumor by default
    pub fn somatic_defaults() -> CallingParameters {
        let mut p = CallingParameters::defaults();
        p.min_var_freq = 0.20;
        return p;
    }

    // Multi-sample consensus calling. Reporting every site uses stricter
    // thresholds than reporting variant sites only.
    pub fn consensus_defaults(variants_only: bool) -> CallingParameters {
        let mut p = CallingParameters::defaults();
        p.strand_filter = true;
        if variants_only {
            p.min_var_freq = 0.01;
            p.p_value = 0.99;
        } else {
            p.min_var_freq = 0.20;
            p.p_value = 0.01;
        }
        return p;
    }

    // purity may be given as a fraction or as a percentage
    pub fn set_normal_purity(& mut self, purity: f64) -> () {
        self.normal_purity = normalize_purity(purity);
    }

    pub fn set_tumor_purity(& mut self, purity: f64) -> () {
        self.tumor_purity = normalize_purity(purity);
    }

    // Variant frequency threshold applied to the tumor sample, lowered when
    // the tumor is contaminated with normal cells
    pub fn tumor_min_var_freq(&self) -> f64 {
        if self.tumor_purity < 1.0 {
            return self.min_var_freq * self.tumor_purity;
        }
        return self.min_var_freq;
    }

    // Variant frequency threshold applied to the normal sample, raised when
    // the normal is contaminated with tumor cells
    pub fn normal_min_var_freq(&self) -> f64 {
        if self.normal_purity < 1.0 && self.normal_purity > 0.0 {
            return (self.min_var_freq / self.normal_purity).min(1.0);
        }
        return self.min_var_freq;
    }

    pub fn validate(&self) -> Result<()> {
        check_range("min-var-freq", self.min_var_freq, 0.0, 1.0)?;
        check_range("min-freq-for-hom", self.min_freq_for_hom, 0.0, 1.0)?;
        check_range("p-value", self.p_value, 0.0, 1.0)?;
        check_range("somatic-p-value", self.somatic_p_value, 0.0, 1.0)?;
        check_range("normal-purity", self.normal_purity, f64::MIN_POSITIVE, 1.0)?;
        check_range("tumor-purity", self.tumor_purity, f64::MIN_POSITIVE, 1.0)?;
        check_range("min-avg-qual", self.min_avg_qual as f64, 0.0, 93.0)?;
        return Ok(());
    }
}

//
// Parameters for father, mother and child calling. Sites that look de novo,
// untransmitted or inconsistent are called again with the relaxed
// thresholds, picking up weak evidence for the allele in the other samples.
//
#[derive(Clone, Debug, PartialEq)]
pub struct TrioParameters {
    pub calling: CallingParameters,
    pub relaxed_min_reads2: u32,
    pub relaxed_min_var_freq: f64,
    pub relaxed_p_value: f64
}

impl TrioParameters {
    pub fn defaults() -> TrioParameters {
        let mut calling = CallingParameters::defaults();
        calling.min_coverage = 20;
        calling.min_reads2 = 4;
        calling.min_var_freq = 0.20;
        calling.p_value = 0.01;
        calling.strand_filter = true;
        TrioParameters {
            calling: calling,
            relaxed_min_reads2: 2,
            relaxed_min_var_freq: 0.05,
            relaxed_p_value: 0.10
        }
    }

    pub fn relaxed(&self) -> CallingParameters {
        let mut p = self.calling.clone();
        p.min_reads2 = self.relaxed_min_reads2;
        p.min_var_freq = self.relaxed_min_var_freq;
        p.p_value = self.relaxed_p_value;
        return p;
    }

    pub fn validate(&self) -> Result<()> {
        self.calling.validate()?;
        check_range("adj-var-freq", self.relaxed_min_var_freq, 0.0, 1.0)?;
        check_range("adj-p-value", self.relaxed_p_value, 0.0, 1.0)?;
        return Ok(());
    }
}

fn normalize_purity(purity: f64) -> f64 {
    if purity > 1.0 {
        return purity / 100.0;
    }
    return purity;
}

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if value.is_nan() || value < min || value > max {
        return Err(VarcallError::InvalidParameter { field: field.to_owned(), min: min, max: max, value: value });
    }
    return Ok(());
}

// How chromosome names in the input pileups are ordered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromosomeOrder {
    // no ordering is assumed, the normal stream is always scanned to its end
    FileOrder,
    Lexical,
    // chr1 < chr2 < chr10 < chrX
    Natural
}

pub fn chromosome_order_to_str(order: ChromosomeOrder) -> &'static str {
    match order {
        ChromosomeOrder::FileOrder => "file",
        ChromosomeOrder::Lexical => "lexical",
        ChromosomeOrder::Natural => "natural",
    }
}

pub fn str_to_chromosome_order(s: &str) -> std::result::Result<ChromosomeOrder, &'static str> {
    match s {
        "file" => Ok(ChromosomeOrder::FileOrder),
        "lexical" => Ok(ChromosomeOrder::Lexical),
        "natural" => Ok(ChromosomeOrder::Natural),
        _ => Err("Unknown chromosome order string")
    }
}

impl ChromosomeOrder {
    // None when the order is unknown
    pub fn compare(&self, a: &str, b: &str) -> Option<Ordering> {
        match self {
            ChromosomeOrder::FileOrder => None,
            ChromosomeOrder::Lexical => Some(a.cmp(b)),
            ChromosomeOrder::Natural => Some(natural_key(a).cmp(&natural_key(b)))
        }
    }
}

// numbered chromosomes first by number, then everything else by name
fn natural_key(chrom: &str) -> (u8, u64, String) {
    let stripped = chrom.strip_prefix("chr").unwrap_or(chrom);
    match stripped.parse::<u64>() {
        Ok(n) => (0, n, String::new()),
        Err(_) => (1, 0, stripped.to_owned())
    }
}

// Parameters for keeping the normal and tumor streams in step
#[derive(Clone, Debug, PartialEq)]
pub struct SyncParameters {
    // optional cap on normal rewinds over the whole run, the normal is
    // rewound at most once per tumor chromosome either way
    pub max_normal_resets: Option<usize>,
    pub chromosome_order: ChromosomeOrder,
    pub max_malformed_records: usize
}

impl SyncParameters {
    pub fn defaults() -> SyncParameters {
        SyncParameters {
            max_normal_resets: None,
            chromosome_order: ChromosomeOrder::FileOrder,
            max_malformed_records: 5
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_purity_scaling() {
        let mut p = CallingParameters::somatic_defaults();
        assert_abs_diff_eq!(p.tumor_min_var_freq(), 0.20, epsilon = 1e-12);
        assert_abs_diff_eq!(p.normal_min_var_freq(), 0.20, epsilon = 1e-12);

        p.set_tumor_purity(50.0);
        p.set_normal_purity(0.8);
        assert_abs_diff_eq!(p.tumor_purity, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p.tumor_min_var_freq(), 0.10, epsilon = 1e-12);
        assert_abs_diff_eq!(p.normal_min_var_freq(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(CallingParameters::defaults().validate().is_ok());

        let mut p = CallingParameters::defaults();
        p.min_var_freq = 1.5;
        match p.validate() {
            Err(VarcallError::InvalidParameter { field, .. }) => assert_eq!(field, "min-var-freq"),
            other => panic!("unexpected result {:?}", other)
        }

        let mut p = CallingParameters::defaults();
        p.tumor_purity = 0.0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_consensus_defaults() {
        let all_sites = CallingParameters::consensus_defaults(false);
        assert!(all_sites.strand_filter);
        assert_abs_diff_eq!(all_sites.min_var_freq, 0.20, epsilon = 1e-12);
        assert_abs_diff_eq!(all_sites.p_value, 0.01, epsilon = 1e-12);

        let variants = CallingParameters::consensus_defaults(true);
        assert_abs_diff_eq!(variants.min_var_freq, 0.01, epsilon = 1e-12);
        assert!(variants.validate().is_ok());
    }

    #[test]
    fn test_chromosome_order() {
        let natural = ChromosomeOrder::Natural;
        assert_eq!(natural.compare("chr2", "chr10"), Some(Ordering::Less));
        assert_eq!(natural.compare("chrX", "chr22"), Some(Ordering::Greater));
        assert_eq!(ChromosomeOrder::Lexical.compare("chr2", "chr10"), Some(Ordering::Greater));
        assert_eq!(ChromosomeOrder::FileOrder.compare("chr1", "chr2"), None);
        assert_eq!(str_to_chromosome_order(chromosome_order_to_str(natural)), Ok(natural));
    }

    #[test]
    fn test_trio_relaxed() {
        let mut p = TrioParameters::defaults();
        let relaxed = p.relaxed();
        assert_eq!(relaxed.min_reads2, 2);
        assert_abs_diff_eq!(relaxed.min_var_freq, 0.05, epsilon = 1e-12);
        assert_abs_diff_eq!(relaxed.p_value, 0.10, epsilon = 1e-12);
        assert_eq!(relaxed.min_coverage, p.calling.min_coverage);
        assert!(p.validate().is_ok());

        p.relaxed_p_value = 1.5;
        assert!(p.validate().is_err());
    }
}
