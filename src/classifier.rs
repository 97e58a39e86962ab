//---------------------------------------------------------
// Copyright 2022 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use log::debug;
use crate::calling_models::CallingMode;
use crate::genotype::{call_consensus, ConsensusCall, Genotype};
use crate::parameters::CallingParameters;
use crate::pileup_stats::AlleleCounts;
use crate::significance::significance;
use crate::utility::phred_score;

// Frequency change between normal and tumor that is large enough to call a
// shared allele somatic or LOH
const MIN_FREQ_DIFFERENCE: f64 = 0.30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SomaticStatus {
    Reference,
    Germline,
    Somatic,
    Loh,
    Unknown,
    IndelFilter,
    NoCall
}

pub fn somatic_status_to_str(status: SomaticStatus) -> &'static str {
    match status {
        SomaticStatus::Reference => "Reference",
        SomaticStatus::Germline => "Germline",
        SomaticStatus::Somatic => "Somatic",
        SomaticStatus::Loh => "LOH",
        SomaticStatus::Unknown => "Unknown",
        SomaticStatus::IndelFilter => "IndelFilter",
        SomaticStatus::NoCall => "NoCall",
    }
}

impl SomaticStatus {
    // numeric code written to the VCF SS field
    pub fn ss_code(&self) -> u8 {
        match self {
            SomaticStatus::Reference => 0,
            SomaticStatus::Germline => 1,
            SomaticStatus::Somatic => 2,
            SomaticStatus::Loh => 3,
            _ => 5
        }
    }
}

// The comparison of one normal/tumor position pair
#[derive(Clone, Debug, PartialEq)]
pub struct SomaticCall
{
    pub status: SomaticStatus,
    pub ref_allele: char,
    pub var_allele: String,
    pub normal: ConsensusCall,
    pub tumor: ConsensusCall,
    pub germline_p: f64,
    pub somatic_p: f64,
    // name of the classification rule that fired
    pub rule: &'static str
}

impl SomaticCall {
    pub fn is_indel(&self) -> bool {
        return self.var_allele.contains('+') || self.var_allele.contains('-');
    }

    // Phred scaled somatic p-value, capped at 255
    pub fn somatic_score(&self) -> u32 {
        let score = match self.status {
            SomaticStatus::Germline if self.somatic_p == 0.0 => 0.0,
            SomaticStatus::Somatic | SomaticStatus::Loh if self.somatic_p == 0.0 => 255.0,
            SomaticStatus::Germline | SomaticStatus::Somatic | SomaticStatus::Loh => phred_score(self.somatic_p),
            _ => 0.0
        };
        return score.min(255.0) as u32;
    }
}

// Everything the classification rules look at for one position
struct Evidence
{
    reference: String,
    normal_call: Genotype,
    tumor_call: Genotype,
    normal_allele: String,
    tumor_allele: String,
    // the variant allele reported for reference sites, the most observed
    // alternate when neither sample has a variant call
    observed_allele: String,
    normal_reads1: u32,
    normal_reads2: u32,
    tumor_reads1: u32,
    tumor_reads2: u32,
    normal_freq: f64,
    tumor_freq: f64,
    somatic_p: f64,
    min_var_freq: f64,
    p_value_threshold: f64,
    somatic_p_value_threshold: f64
}

impl Evidence {
    fn difference_is_significant(&self) -> bool {
        return self.somatic_p <= self.somatic_p_value_threshold || self.normal_freq == 0.0;
    }

    // significance of the combined variant reads against a reference-only sample
    fn pooled_p_value(&self) -> f64 {
        let total_reads1 = self.normal_reads1 + self.tumor_reads1;
        let total_reads2 = self.normal_reads2 + self.tumor_reads2;
        return significance(total_reads1 + total_reads2, 0, total_reads1, total_reads2);
    }

    fn verdict(&self, status: SomaticStatus, allele: &str) -> Verdict {
        return Verdict { status: status, var_allele: allele.to_owned(), germline_p: 1.0, normal_as_reference: false };
    }
}

struct Verdict
{
    status: SomaticStatus,
    var_allele: String,
    germline_p: f64,
    normal_as_reference: bool
}

// A classification rule. Rules are evaluated in order and the first one
// whose guard holds decides the status.
struct Rule
{
    name: &'static str,
    applies: fn(&Evidence) -> bool,
    outcome: fn(&Evidence) -> Verdict
}

const RULES: [Rule; 13] = [
    Rule { name: "indel-filter", applies: mixed_indel_and_snv, outcome: indel_filter },
    Rule { name: "matching-calls", applies: calls_match, outcome: matching_calls },
    Rule { name: "somatic-heterozygous", applies: somatic_heterozygous, outcome: somatic_tumor_allele },
    Rule { name: "somatic-homozygous", applies: somatic_homozygous, outcome: somatic_tumor_allele },
    Rule { name: "loh-tumor-reference", applies: loh_tumor_reference, outcome: loh_normal_allele },
    Rule { name: "loh-tumor-homozygous", applies: loh_tumor_homozygous, outcome: loh_tumor_allele },
    Rule { name: "shared-allele", applies: shared_allele_significant, outcome: shared_allele_by_frequency },
    Rule { name: "different-heterozygous", applies: different_heterozygous, outcome: somatic_normal_reference },
    Rule { name: "unknown", applies: difference_is_significant, outcome: unknown_one_allele },
    Rule { name: "shared-allele-pooled", applies: shared_allele, outcome: shared_allele_pooled },
    Rule { name: "normal-reference", applies: normal_is_reference, outcome: reference_tumor_allele },
    Rule { name: "tumor-reference", applies: tumor_is_reference, outcome: reference_normal_allele },
    Rule { name: "unknown-alleles", applies: always, outcome: unknown_both_alleles },
];

fn mixed_indel_and_snv(e: &Evidence) -> bool {
    return (e.tumor_call.is_indel() && !e.normal_call.is_indel() && !e.normal_call.is_reference()) ||
           (e.normal_call.is_indel() && !e.tumor_call.is_indel() && !e.tumor_call.is_reference());
}

fn indel_filter(e: &Evidence) -> Verdict {
    let allele = if e.tumor_allele != e.reference { &e.tumor_allele } else { &e.normal_allele };
    return e.verdict(SomaticStatus::IndelFilter, allele);
}

fn calls_match(e: &Evidence) -> bool {
    return e.normal_call == e.tumor_call &&
           (e.normal_call.is_reference() || e.somatic_p > e.somatic_p_value_threshold);
}

fn matching_calls(e: &Evidence) -> Verdict {
    if e.normal_call.is_reference() {
        return e.verdict(SomaticStatus::Reference, &e.observed_allele);
    }

    let p = e.pooled_p_value();
    let mut v = if p <= e.somatic_p_value_threshold {
        e.verdict(SomaticStatus::Germline, &e.tumor_allele)
    } else {
        e.verdict(SomaticStatus::Reference, &e.observed_allele)
    };
    v.germline_p = p;
    return v;
}

fn somatic_heterozygous(e: &Evidence) -> bool {
    return e.difference_is_significant() && e.normal_call.is_reference() &&
           e.tumor_call.is_heterozygous() && e.tumor_freq > e.normal_freq;
}

fn somatic_homozygous(e: &Evidence) -> bool {
    return e.difference_is_significant() && e.normal_call.is_reference() && e.tumor_call.is_homozygous();
}

fn somatic_tumor_allele(e: &Evidence) -> Verdict {
    return e.verdict(SomaticStatus::Somatic, &e.tumor_allele);
}

fn loh_tumor_reference(e: &Evidence) -> bool {
    return e.difference_is_significant() && e.tumor_call.is_reference() && e.normal_call.is_heterozygous();
}

fn loh_normal_allele(e: &Evidence) -> Verdict {
    return e.verdict(SomaticStatus::Loh, &e.normal_allele);
}

fn loh_tumor_homozygous(e: &Evidence) -> bool {
    return e.difference_is_significant() && e.normal_call.is_heterozygous() && e.tumor_call.is_homozygous();
}

fn loh_tumor_allele(e: &Evidence) -> Verdict {
    return e.verdict(SomaticStatus::Loh, &e.tumor_allele);
}

fn shared_allele(e: &Evidence) -> bool {
    return e.tumor_allele == e.normal_allele;
}

fn shared_allele_significant(e: &Evidence) -> bool {
    return e.difference_is_significant() && shared_allele(e);
}

fn shared_allele_by_frequency(e: &Evidence) -> Verdict {
    let difference = e.tumor_freq - e.normal_freq;
    if e.normal_freq > e.min_var_freq {
        return e.verdict(SomaticStatus::Germline, &e.tumor_allele);
    } else if difference >= MIN_FREQ_DIFFERENCE && e.tumor_freq > e.normal_freq {
        return e.verdict(SomaticStatus::Somatic, &e.tumor_allele);
    } else if difference <= -MIN_FREQ_DIFFERENCE && e.tumor_freq < e.normal_freq {
        return e.verdict(SomaticStatus::Loh, &e.tumor_allele);
    }

    let mut v = e.verdict(SomaticStatus::Germline, &e.tumor_allele);
    v.germline_p = e.pooled_p_value();
    return v;
}

fn different_heterozygous(e: &Evidence) -> bool {
    return e.difference_is_significant() && e.tumor_freq > e.normal_freq &&
           e.normal_call.is_heterozygous() && e.tumor_call.is_heterozygous();
}

fn somatic_normal_reference(e: &Evidence) -> Verdict {
    let mut v = e.verdict(SomaticStatus::Somatic, &e.tumor_allele);
    v.normal_as_reference = true;
    return v;
}

fn difference_is_significant(e: &Evidence) -> bool {
    return e.difference_is_significant();
}

fn unknown_one_allele(e: &Evidence) -> Verdict {
    let allele = if e.tumor_allele == e.reference { &e.normal_allele } else { &e.tumor_allele };
    return e.verdict(SomaticStatus::Unknown, allele);
}

fn shared_allele_pooled(e: &Evidence) -> Verdict {
    let p = e.pooled_p_value();
    let mut v = if p <= e.p_value_threshold {
        e.verdict(SomaticStatus::Germline, &e.tumor_allele)
    } else {
        e.verdict(SomaticStatus::Reference, &e.observed_allele)
    };
    v.germline_p = p;
    return v;
}

fn normal_is_reference(e: &Evidence) -> bool {
    return e.normal_call.is_reference();
}

fn reference_tumor_allele(e: &Evidence) -> Verdict {
    return e.verdict(SomaticStatus::Reference, &e.tumor_allele);
}

fn tumor_is_reference(e: &Evidence) -> bool {
    return e.tumor_call.is_reference();
}

fn reference_normal_allele(e: &Evidence) -> Verdict {
    return e.verdict(SomaticStatus::Reference, &e.normal_allele);
}

fn always(_e: &Evidence) -> bool {
    return true;
}

fn unknown_both_alleles(e: &Evidence) -> Verdict {
    return e.verdict(SomaticStatus::Unknown, &format!("{}/{}", e.normal_allele, e.tumor_allele));
}

// The first rule whose guard holds, with its verdict
fn evaluate(e: &Evidence) -> (&'static str, Verdict) {
    for rule in RULES.iter() {
        if (rule.applies)(e) {
            return (rule.name, (rule.outcome)(e));
        }
    }
    return ("unknown-alleles", unknown_both_alleles(e));
}

//
// Compare the normal and tumor evidence at one position and decide whether
// the site is reference, germline, somatic or shows loss of heterozygosity
//
pub fn classify(ref_base: char,
                normal_counts: &AlleleCounts,
                tumor_counts: &AlleleCounts,
                params: &CallingParameters) -> SomaticCall
{
    let ref_base = ref_base.to_ascii_uppercase();
    let reference = ref_base.to_string();

    let best_call = |counts: &AlleleCounts, min_var_freq: f64| -> ConsensusCall {
        let mut calls = call_consensus(ref_base, counts, CallingMode::Consensus, params.min_reads2,
                                       min_var_freq, params.min_avg_qual, params.min_freq_for_hom);
        return calls.swap_remove(0);
    };

    let tumor = best_call(tumor_counts, params.tumor_min_var_freq());
    let mut normal = best_call(normal_counts, params.normal_min_var_freq());

    let mut result = SomaticCall {
        status: SomaticStatus::NoCall,
        ref_allele: ref_base,
        var_allele: String::new(),
        normal: ConsensusCall::no_call(),
        tumor: ConsensusCall::no_call(),
        germline_p: 1.0,
        somatic_p: 1.0,
        rule: "no-call"
    };

    if tumor.call == Genotype::NoCall || normal.call == Genotype::NoCall {
        result.normal = normal;
        result.tumor = tumor;
        return result;
    }

    let tumor_allele = tumor.call.allele().unwrap_or(reference.clone());
    let normal_allele = normal.call.allele().unwrap_or(reference.clone());

    // the normal is compared against the tumor's variant allele
    if tumor_allele != reference {
        normal.set_variant_evidence(&tumor_allele, normal_counts.get(&tumor_allele));
    }

    let observed_allele = if tumor_allele != reference {
        tumor_allele.clone()
    } else if normal_allele != reference {
        normal_allele.clone()
    } else {
        tumor.variant_allele.clone().or(normal.variant_allele.clone()).unwrap_or(reference.clone())
    };

    let somatic_p = significance(normal.reads1, normal.reads2, tumor.reads1, tumor.reads2);

    let evidence = Evidence {
        reference: reference.clone(),
        normal_call: normal.call.clone(),
        tumor_call: tumor.call.clone(),
        normal_allele: normal_allele,
        tumor_allele: tumor_allele,
        observed_allele: observed_allele,
        normal_reads1: normal.reads1,
        normal_reads2: normal.reads2,
        tumor_reads1: tumor.reads1,
        tumor_reads2: tumor.reads2,
        normal_freq: normal.var_freq,
        tumor_freq: tumor.var_freq,
        somatic_p: somatic_p,
        min_var_freq: params.min_var_freq,
        p_value_threshold: params.p_value,
        somatic_p_value_threshold: params.somatic_p_value
    };

    let (rule, verdict) = evaluate(&evidence);
    debug!("rule {} gives {} ({} vs {})", rule, somatic_status_to_str(verdict.status),
           evidence.normal_call.code(), evidence.tumor_call.code());

    if verdict.normal_as_reference {
        normal.call = Genotype::Reference(ref_base);
    }
    result.status = verdict.status;
    result.var_allele = verdict.var_allele;
    result.germline_p = verdict.germline_p;
    result.rule = rule;

    result.somatic_p = somatic_p;
    result.normal = normal;
    result.tumor = tumor;
    return result;
}
