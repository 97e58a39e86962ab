//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use crate::significance::significance;

const MIN_STRAND_FRACTION: f64 = 0.10;
const MAX_STRAND_FRACTION: f64 = 0.90;
const MIN_STRAND_P_VALUE: f64 = 0.01;
const MAX_STRANDEDNESS_DIFFERENCE: f64 = 0.10;

#[derive(Clone, Debug, PartialEq)]
pub struct StrandFilterResult
{
    pub passed: bool,
    pub p_value: f64,
    // fraction of variant reads on the forward strand
    pub var_strand_plus: f64
}

fn is_balanced(fraction: f64) -> bool {
    return fraction >= MIN_STRAND_FRACTION && fraction <= MAX_STRAND_FRACTION;
}

fn strand_fraction(plus: u32, minus: u32) -> f64 {
    if plus + minus == 0 {
        return 0.5;
    }
    return plus as f64 / (plus + minus) as f64;
}

fn strand_bias_p_value(table: [u32; 4]) -> f64 {
    return significance(table[0], table[1], table[2], table[3]);
}

//
// Fail a variant when its reads come almost entirely from one strand
// while the reference reads at the same position do not
//
pub fn strand_filter(reads1_plus: u32, reads1_minus: u32, reads2_plus: u32, reads2_minus: u32) -> StrandFilterResult
{
    let var_strand_plus = strand_fraction(reads2_plus, reads2_minus);
    let mut result = StrandFilterResult { passed: true, p_value: 1.0, var_strand_plus: var_strand_plus };

    if is_balanced(var_strand_plus) {
        return result;
    }

    let mut ref_strand_plus = 0.5;
    if reads1_plus + reads1_minus > 1 {
        ref_strand_plus = strand_fraction(reads1_plus, reads1_minus);
        result.p_value = strand_bias_p_value([reads1_plus, reads1_minus, reads2_plus, reads2_minus]);
    } else {
        // too few reference reads, compare against an even split of the variant reads
        let total = reads2_plus + reads2_minus;
        let test_plus = total / 2;
        result.p_value = strand_bias_p_value([test_plus, total - test_plus, reads2_plus, reads2_minus]);
    }

    if is_balanced(ref_strand_plus) && result.p_value < MIN_STRAND_P_VALUE {
        result.passed = false;
    }
    return result;
}

//
// The filter used for tumor/normal comparisons, flags a tumor variant whose
// strandedness is extreme and differs from the reference reads' strandedness
//
pub fn fails_somatic_strand_filter(reads1_plus: u32, reads1_minus: u32, reads2_plus: u32, reads2_minus: u32) -> bool
{
    if reads2_plus + reads2_minus == 0 {
        return false;
    }

    let strandedness2 = strand_fraction(reads2_plus, reads2_minus);
    let mut difference = 0.0;
    if reads1_plus + reads1_minus > 0 {
        difference = (strand_fraction(reads1_plus, reads1_minus) - strandedness2).abs();
    }
    return difference > MAX_STRANDEDNESS_DIFFERENCE && !is_balanced(strandedness2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_variant_passes() {
        let r = strand_filter(10, 10, 6, 4);
        assert!(r.passed);
        assert_eq!(r.p_value, 1.0);
    }

    #[test]
    fn test_one_strand_variant_fails() {
        let r = strand_filter(15, 15, 20, 0);
        assert!(!r.passed);
        assert!(r.p_value < 0.01);
        assert_eq!(r.var_strand_plus, 1.0);
    }

    #[test]
    fn test_biased_reference_does_not_fail() {
        // both alleles come from the forward strand, likely an amplicon
        let r = strand_filter(20, 0, 20, 0);
        assert!(r.passed);
    }

    #[test]
    fn test_homozygous_variant_uses_even_split() {
        let r = strand_filter(0, 1, 0, 30);
        assert!(!r.passed);

        let r = strand_filter(0, 0, 2, 0);
        assert!(r.passed);
    }

    #[test]
    fn test_somatic_strand_filter() {
        assert!(fails_somatic_strand_filter(10, 10, 12, 0));
        assert!(!fails_somatic_strand_filter(10, 10, 6, 6));
        // reference reads are just as biased
        assert!(!fails_somatic_strand_filter(10, 0, 12, 0));
        // no reference reads, no difference can be measured
        assert!(!fails_somatic_strand_filter(0, 0, 12, 0));
        assert!(!fails_somatic_strand_filter(5, 5, 0, 0));
    }
}
