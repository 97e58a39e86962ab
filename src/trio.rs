//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::fs::File;
use std::io::{BufWriter, Write};
use anyhow::Context;
use log::{debug, info, warn};

use crate::calling_models::CallingMode;
use crate::consensus_call::call_sample;
use crate::errors::{Result, VarcallError};
use crate::genotype::{call_consensus, ConsensusCall, Genotype};
use crate::output::{format_p_value, format_percent, vcf_alleles, RecordWriter};
use crate::parameters::{CallingParameters, SyncParameters, TrioParameters};
use crate::pileup::{MalformedBudget, MpileupRow};
use crate::pileup_stats::{is_indel, AlleleCounts};
use crate::significance::significance;
use crate::strand_filter::strand_filter;
use crate::summary::TrioSummary;
use crate::utility::{open_line_source, phred_score, LineSource};

// Pooled variant frequency used only to find the strands of the variant reads
const STRAND_MIN_VAR_FREQ: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrioStatus {
    Reference,
    // the child's genotype can be built from one allele of each parent
    Transmitted,
    // a parent carries a variant the child did not inherit
    Untransmitted,
    DeNovo,
    // Mendelian inheritance error
    Mie,
    MultipleAlleles,
    MissingData
}

pub fn trio_status_to_str(status: TrioStatus) -> &'static str {
    match status {
        TrioStatus::Reference => "Reference",
        TrioStatus::Transmitted => "Transmitted",
        TrioStatus::Untransmitted => "Untransmitted",
        TrioStatus::DeNovo => "DeNovo",
        TrioStatus::Mie => "MIE",
        TrioStatus::MultipleAlleles => "MultipleAlleles",
        TrioStatus::MissingData => "MissingData",
    }
}

impl TrioStatus {
    // numeric code written to the VCF STATUS field
    pub fn status_code(&self) -> Option<u8> {
        match self {
            TrioStatus::Untransmitted => Some(1),
            TrioStatus::Transmitted => Some(2),
            TrioStatus::DeNovo => Some(3),
            TrioStatus::Mie => Some(4),
            _ => None
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrioCall
{
    pub father: ConsensusCall,
    pub mother: ConsensusCall,
    pub child: ConsensusCall,
    pub status: TrioStatus,
    // status before the site was called again with relaxed thresholds
    pub initial_status: Option<TrioStatus>
}

impl TrioCall {
    pub fn filter(&self, strand_failed: bool) -> &'static str {
        if self.status == TrioStatus::Mie {
            return "mendelError";
        } else if strand_failed {
            return "str10";
        }
        return "PASS";
    }
}

// The two alleles of a genotype, het indels carry the reference base
fn genotype_alleles(call: &Genotype, reference: &str) -> (String, String) {
    match call {
        Genotype::NoCall => ("N".to_owned(), "N".to_owned()),
        Genotype::Reference(_) => (reference.to_owned(), reference.to_owned()),
        Genotype::HetSnv { alt, .. } => (reference.to_owned(), alt.to_string()),
        Genotype::HomSnv(a) => (a.to_string(), a.to_string()),
        Genotype::HetIndel(a) => (reference.to_owned(), a.clone()),
        Genotype::HomIndel(a) => (a.clone(), a.clone())
    }
}

// The strongest non-reference allele seen in a sample, called or not
fn evidence_allele(call: &ConsensusCall, reference: &str) -> String {
    return call.variant_allele.clone().unwrap_or(reference.to_owned());
}

fn trio_status(reference: &str, father: &ConsensusCall, mother: &ConsensusCall, child: &ConsensusCall) -> TrioStatus {
    let calls = [father, mother, child];
    if calls.iter().any(|c| c.call == Genotype::NoCall) {
        return TrioStatus::MissingData;
    }
    if calls.iter().all(|c| c.call.is_reference()) {
        return TrioStatus::Reference;
    }
    if father.call.is_reference() && mother.call.is_reference() {
        return TrioStatus::DeNovo;
    }

    let (f1, f2) = genotype_alleles(&father.call, reference);
    let (m1, m2) = genotype_alleles(&mother.call, reference);
    let (c1, c2) = genotype_alleles(&child.call, reference);
    let from_father = |a: &str| a == f1 || a == f2;
    let from_mother = |a: &str| a == m1 || a == m2;

    if (from_father(&c1) && from_mother(&c2)) || (from_father(&c2) && from_mother(&c1)) {
        if child.call.is_reference() {
            return TrioStatus::Untransmitted;
        }
        return TrioStatus::Transmitted;
    }

    // a child allele neither parent shows any evidence for
    let child_allele = child.call.allele().unwrap_or(reference.to_owned());
    if !child.call.is_reference() &&
       child_allele != evidence_allele(father, reference) &&
       child_allele != evidence_allele(mother, reference) {
        return TrioStatus::MultipleAlleles;
    }
    return TrioStatus::Mie;
}

fn classify_trio(ref_base: char,
                 father: &AlleleCounts,
                 mother: &AlleleCounts,
                 child: &AlleleCounts,
                 params: &CallingParameters) -> TrioCall
{
    let reference = ref_base.to_ascii_uppercase().to_string();
    let father = call_sample(ref_base, father, params, CallingMode::Consensus);
    let mother = call_sample(ref_base, mother, params, CallingMode::Consensus);
    let child = call_sample(ref_base, child, params, CallingMode::Consensus);
    let status = trio_status(&reference, &father, &mother, &child);
    return TrioCall { father: father, mother: mother, child: child, status: status, initial_status: None };
}

// De novo and inconsistent sites are always called again. Untransmitted
// sites are called again when the child shows reads for a parent's allele.
fn needs_recall(ref_base: char, call: &TrioCall) -> bool {
    let reference = ref_base.to_ascii_uppercase().to_string();
    match call.status {
        TrioStatus::DeNovo | TrioStatus::Mie => return true,
        TrioStatus::Untransmitted => {
            let child_allele = evidence_allele(&call.child, &reference);
            return child_allele != reference &&
                   (child_allele == evidence_allele(&call.father, &reference) ||
                    child_allele == evidence_allele(&call.mother, &reference));
        }
        _ => return false
    }
}

//
// Call the father, mother and child at one position and decide how the
// child's genotype relates to the parents
//
pub fn call_trio(ref_base: char,
                 father: &AlleleCounts,
                 mother: &AlleleCounts,
                 child: &AlleleCounts,
                 params: &TrioParameters) -> TrioCall
{
    let strict = classify_trio(ref_base, father, mother, child, &params.calling);
    if !needs_recall(ref_base, &strict) {
        return strict;
    }

    let mut relaxed = classify_trio(ref_base, father, mother, child, &params.relaxed());
    if relaxed.status != strict.status {
        debug!("{} re-called as {}", trio_status_to_str(strict.status), trio_status_to_str(relaxed.status));
    }
    relaxed.initial_status = Some(strict.status);
    return relaxed;
}

// Variant alleles numbered in the order father, mother, child first call them
fn number_allele(alleles: & mut Vec<String>, allele: &str) -> usize {
    if let Some(i) = alleles.iter().position(|a| a == allele) {
        return i + 1;
    }
    alleles.push(allele.to_owned());
    return alleles.len();
}

fn sample_field(call: &ConsensusCall, genotype: &str, depth: u32, quality_depth: u32) -> String {
    if call.call == Genotype::NoCall {
        return format!("./.:.:{}", quality_depth);
    }

    // a reference call is scored against a possible heterozygote
    let gq = if call.call.is_reference() {
        let expected1 = call.depth() / 2;
        phred_score(significance(call.reads1, call.reads2, expected1, call.depth() - expected1))
    } else {
        phred_score(call.p_value)
    };

    return format!("{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
                   genotype, gq as u32, depth, quality_depth, call.reads1, call.reads2,
                   format_percent(call.var_freq), format_p_value(call.p_value),
                   call.qual1 as u32, call.qual2 as u32,
                   call.reads1_plus, call.reads1_minus, call.reads2_plus, call.reads2_minus);
}

// One trio position ready to be written
#[derive(Clone, Debug, PartialEq)]
pub struct TrioRecord
{
    pub fields: Vec<String>,
    pub indel: bool,
    pub strand_failed: bool
}

// None when no sample carries a variant allele
pub fn trio_record(row: &MpileupRow, call: &TrioCall, quality_depths: [u32; 3], strand_failed: bool) -> Option<TrioRecord> {
    let reference = row.ref_base.to_string();
    let mut alleles: Vec<String> = Vec::new();
    let mut samples = Vec::new();

    let calls = [&call.father, &call.mother, &call.child];
    for (i, c) in calls.iter().enumerate() {
        let genotype = match c.call.allele() {
            Some(a) if c.call.is_variant() => {
                let n = number_allele(& mut alleles, &a);
                if c.call.is_homozygous() { format!("{}/{}", n, n) } else { format!("0/{}", n) }
            }
            _ => "0/0".to_owned()
        };
        samples.push(sample_field(c, &genotype, row.samples[i].depth, quality_depths[i]));
    }

    if alleles.is_empty() {
        return None;
    }

    let (ref_column, alt_column) = vcf_alleles(row.ref_base, &alleles);
    let mut info = format!("ADP={}", quality_depths.iter().sum::<u32>() / 3);
    if let Some(code) = call.status.status_code() {
        info += &format!(";STATUS={}", code);
    }
    if call.status == TrioStatus::DeNovo {
        info += ";DENOVO";
    }

    let mut fields = vec![
        row.chrom.clone(), row.position.to_string(), ".".to_owned(), ref_column, alt_column, ".".to_owned(),
        call.filter(strand_failed).to_owned(), info, "GT:GQ:SDP:DP:RD:AD:FREQ:PVAL:RBQ:ABQ:RDF:RDR:ADF:ADR".to_owned()
    ];
    fields.extend(samples);
    debug!("{}:{} {} {}", row.chrom, row.position, reference, trio_status_to_str(call.status));

    return Some(TrioRecord {
        fields: fields,
        indel: alleles.iter().any(|a| is_indel(a)),
        strand_failed: strand_failed
    });
}

// Strand bias of the variant reads pooled over all three samples
fn pooled_strand_failed(ref_base: char, counts: &[AlleleCounts], params: &CallingParameters) -> bool {
    let mut pooled = AlleleCounts::new();
    for c in counts {
        pooled.merge(c);
    }
    let mut calls = call_consensus(ref_base, &pooled, CallingMode::Consensus, params.min_reads2,
                                   STRAND_MIN_VAR_FREQ, params.min_avg_qual, params.min_freq_for_hom);
    let call = calls.swap_remove(0);
    if !call.call.is_variant() {
        return false;
    }
    return !strand_filter(call.reads1_plus, call.reads1_minus, call.reads2_plus, call.reads2_minus).passed;
}

// Call one mpileup position, None when it is not covered in every sample
fn trio_site(row: &MpileupRow, line_number: u64, params: &TrioParameters) -> Result<Option<(TrioCall, Option<TrioRecord>)>> {
    if row.samples.len() < 3 {
        return Err(VarcallError::malformed(line_number, "expected father, mother and child samples"));
    }

    let calling = &params.calling;
    let samples = &row.samples[0..3];
    let quality_depths = [
        samples[0].quality_depth(calling.min_avg_qual),
        samples[1].quality_depth(calling.min_avg_qual),
        samples[2].quality_depth(calling.min_avg_qual)
    ];
    if quality_depths.iter().any(|&d| d < calling.min_coverage) {
        return Ok(None);
    }

    let mut counts = Vec::new();
    for s in samples {
        counts.push(s.allele_counts(row.ref_base, calling.min_avg_qual, line_number)?);
    }

    let strand_failed = calling.strand_filter && pooled_strand_failed(row.ref_base, &counts, calling);
    let call = call_trio(row.ref_base, &counts[0], &counts[1], &counts[2], params);
    if call.status == TrioStatus::Reference {
        return Ok(Some((call, None)));
    }
    let record = trio_record(row, &call, quality_depths, strand_failed);
    return Ok(Some((call, record)));
}

pub fn call_trio_mpileup<S: LineSource, W: Write>(mut input: S,
                                                  params: &TrioParameters,
                                                  sync: &SyncParameters,
                                                  snp: & mut RecordWriter<W>,
                                                  indel: & mut RecordWriter<W>) -> Result<TrioSummary>
{
    let mut summary = TrioSummary::new();
    let mut budget = MalformedBudget::new(sync.max_malformed_records);
    let mut line_number = 0;
    let mut warned_extra_samples = false;

    while let Some(line) = input.next_line().transpose() {
        line_number += 1;
        let site = line.and_then(|line| MpileupRow::parse(&line, line_number)).and_then(|row| {
            if row.samples.len() > 3 && !warned_extra_samples {
                warn!("more than 3 samples in the mpileup, only the first 3 are used as father, mother and child");
                warned_extra_samples = true;
            }
            return trio_site(&row, line_number, params);
        });

        let site = match site {
            Ok(s) => s,
            Err(e) => {
                budget.record(e)?;
                continue;
            }
        };

        summary.positions += 1;
        let (call, record) = match site {
            Some(s) => s,
            None => continue
        };
        summary.covered_positions += 1;
        if let Some(initial) = call.initial_status {
            if initial != call.status {
                summary.record_recall(initial, call.status);
            }
        }

        let record = match record {
            Some(r) => r,
            None => continue
        };
        summary.record_site(call.status, record.indel, record.strand_failed);
        if record.indel {
            indel.write_fields(&record.fields)?;
        } else {
            snp.write_fields(&record.fields)?;
        }
    }

    summary.malformed = budget.count();
    snp.flush()?;
    indel.flush()?;
    return Ok(summary);
}

fn create_output(path: &str) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("could not create output file {}", path))?;
    return Ok(BufWriter::new(file));
}

pub fn trio_call(mpileup: &str,
                 output_basename: &str,
                 headers: bool,
                 params: &TrioParameters,
                 sync: &SyncParameters) -> anyhow::Result<()>
{
    params.validate()?;
    let snp_path = format!("{}.snp.vcf", output_basename);
    let indel_path = format!("{}.indel.vcf", output_basename);
    info!("SNPs will be written to {}", snp_path);
    info!("indels will be written to {}", indel_path);
    info!("min coverage: {}", params.calling.min_coverage);
    info!("min reads2: {}", params.calling.min_reads2);
    info!("min var freq: {}", params.calling.min_var_freq);
    info!("min avg qual: {}", params.calling.min_avg_qual);
    info!("p-value threshold: {}", params.calling.p_value);
    info!("relaxed min reads2: {}", params.relaxed_min_reads2);
    info!("relaxed min var freq: {}", params.relaxed_min_var_freq);
    info!("relaxed p-value: {}", params.relaxed_p_value);

    let input = open_line_source(mpileup).with_context(|| format!("could not open mpileup {}", mpileup))?;
    let mut snp = RecordWriter::trio(create_output(&snp_path)?, params.calling.min_avg_qual, headers)?;
    let mut indel = RecordWriter::trio(create_output(&indel_path)?, params.calling.min_avg_qual, headers)?;
    let summary = call_trio_mpileup(input, params, sync, & mut snp, & mut indel)?;
    summary.log();
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::MemoryLineSource;

    fn counts(alleles: &[(&str, u32)]) -> AlleleCounts {
        let mut c = AlleleCounts::new();
        for (a, n) in alleles {
            c.insert(a, n - n / 2, n / 2, 30);
        }
        return c;
    }

    fn run(father: &[(&str, u32)], mother: &[(&str, u32)], child: &[(&str, u32)]) -> TrioCall {
        return call_trio('A', &counts(father), &counts(mother), &counts(child), &TrioParameters::defaults());
    }

    #[test]
    fn test_reference() {
        let t = run(&[("A", 20)], &[("A", 20)], &[("A", 20)]);
        assert_eq!(t.status, TrioStatus::Reference);
        assert_eq!(t.initial_status, None);
    }

    #[test]
    fn test_transmitted() {
        let t = run(&[("A", 10), ("G", 10)], &[("A", 20)], &[("A", 10), ("G", 10)]);
        assert_eq!(t.status, TrioStatus::Transmitted);
        assert_eq!(t.status.status_code(), Some(2));
        assert_eq!(t.filter(false), "PASS");
        assert_eq!(t.filter(true), "str10");
    }

    #[test]
    fn test_de_novo() {
        let t = run(&[("A", 20)], &[("A", 20)], &[("A", 10), ("G", 10)]);
        assert_eq!(t.status, TrioStatus::DeNovo);
        assert_eq!(t.initial_status, Some(TrioStatus::DeNovo));
        assert_eq!(t.status.status_code(), Some(3));
    }

    #[test]
    fn test_de_novo_recalled_against_parent_evidence() {
        // five father reads are below the strict frequency but enough when relaxed
        let t = run(&[("A", 30), ("G", 5)], &[("A", 35)], &[("A", 10), ("G", 10)]);
        assert_eq!(t.initial_status, Some(TrioStatus::DeNovo));
        assert_eq!(t.status, TrioStatus::Transmitted);
        assert!(t.father.call.is_heterozygous());
    }

    #[test]
    fn test_untransmitted() {
        let t = run(&[("A", 10), ("G", 10)], &[("A", 20)], &[("A", 20)]);
        assert_eq!(t.status, TrioStatus::Untransmitted);
        assert_eq!(t.initial_status, None);
        assert_eq!(t.status.status_code(), Some(1));
    }

    #[test]
    fn test_untransmitted_recalled_when_child_has_reads() {
        let t = run(&[("A", 10), ("G", 10)], &[("A", 20)], &[("A", 30), ("G", 5)]);
        assert_eq!(t.initial_status, Some(TrioStatus::Untransmitted));
        assert_eq!(t.status, TrioStatus::Transmitted);
    }

    #[test]
    fn test_mendel_error() {
        // reference child of two homozygous variant parents
        let t = run(&[("G", 20)], &[("G", 20)], &[("A", 20)]);
        assert_eq!(t.status, TrioStatus::Mie);
        assert_eq!(t.initial_status, Some(TrioStatus::Mie));
        assert_eq!(t.filter(false), "mendelError");
        assert_eq!(t.filter(true), "mendelError");

        // homozygous child with a reference father
        let t = run(&[("A", 20)], &[("G", 20)], &[("G", 20)]);
        assert_eq!(t.status, TrioStatus::Mie);
        assert_eq!(t.status.status_code(), Some(4));
    }

    #[test]
    fn test_multiple_alleles() {
        let t = run(&[("A", 20)], &[("A", 10), ("G", 10)], &[("A", 10), ("T", 10)]);
        assert_eq!(t.status, TrioStatus::MultipleAlleles);
        assert_eq!(t.status.status_code(), None);
    }

    #[test]
    fn test_missing_data() {
        let t = run(&[("A", 20)], &[("A", 20)], &[]);
        assert_eq!(t.status, TrioStatus::MissingData);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(trio_status_to_str(TrioStatus::Mie), "MIE");
        assert_eq!(trio_status_to_str(TrioStatus::DeNovo), "DeNovo");
    }

    fn quals(n: usize) -> String {
        return "I".repeat(n);
    }

    #[test]
    fn test_call_trio_mpileup() {
        let het = ".....,,,,,GGGGGggggg";
        let reference = "..........,,,,,,,,,,";
        let q = quals(20);
        let transmitted = format!("chr1\t100\tA\t20\t{}\t{}\t20\t{}\t{}\t20\t{}\t{}", het, q, reference, q, het, q);
        let de_novo = format!("chr1\t101\tA\t20\t{}\t{}\t20\t{}\t{}\t20\t{}\t{}", reference, q, reference, q, het, q);
        let all_reference = format!("chr1\t102\tA\t20\t{}\t{}\t20\t{}\t{}\t20\t{}\t{}", reference, q, reference, q, reference, q);
        let uncovered = "chr1\t103\tA\t2\t..\tII\t2\t..\tII\t2\t..\tII";
        let input = [transmitted.as_str(), de_novo.as_str(), "chr1\t104\tA\t1\t.\tI", all_reference.as_str(), uncovered];

        let mut snp = RecordWriter::trio(Vec::new(), 15, true).unwrap();
        let mut indel = RecordWriter::trio(Vec::new(), 15, true).unwrap();
        let summary = call_trio_mpileup(MemoryLineSource::new(&input), &TrioParameters::defaults(),
                                        &SyncParameters::defaults(), & mut snp, & mut indel).unwrap();
        assert_eq!(summary.positions, 4);
        assert_eq!(summary.covered_positions, 3);
        assert_eq!(summary.variant_positions, 2);
        assert_eq!(summary.reported, 2);
        assert_eq!(summary.de_novo_reported, 1);
        assert_eq!(summary.malformed, 1);

        let text = String::from_utf8(snp.into_inner().unwrap()).unwrap();
        let records: Vec<Vec<&str>> = text.lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| l.split('\t').collect())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(text.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tFather\tMother\tChild"));

        assert_eq!(&records[0][0..7], &["chr1", "100", ".", "A", "G", ".", "PASS"]);
        assert_eq!(records[0][7], "ADP=20;STATUS=2");
        assert!(records[0][9].starts_with("0/1:"));
        assert!(records[0][10].starts_with("0/0:"));
        assert!(records[0][11].starts_with("0/1:"));
        assert_eq!(records[0][9].split(':').count(), 14);

        assert_eq!(records[1][1], "101");
        assert_eq!(records[1][7], "ADP=20;STATUS=3;DENOVO");

        let indels = String::from_utf8(indel.into_inner().unwrap()).unwrap();
        assert!(indels.lines().all(|l| l.starts_with('#')));
    }

    #[test]
    fn test_indel_site_goes_to_indel_output() {
        let q = quals(20);
        let reference = "..........,,,,,,,,,,";
        let insertion = ".....,,,,,.+2AG.+2AG.+2AG.+2AG.+2AG,+2ag,+2ag,+2ag,+2ag,+2ag";
        let line = format!("chr2\t50\tC\t20\t{}\t{}\t20\t{}\t{}\t20\t{}\t{}", insertion, q, reference, q, insertion, q);

        let mut snp = RecordWriter::trio(Vec::new(), 15, false).unwrap();
        let mut indel = RecordWriter::trio(Vec::new(), 15, false).unwrap();
        let summary = call_trio_mpileup(MemoryLineSource::new(&[line.as_str()]), &TrioParameters::defaults(),
                                        &SyncParameters::defaults(), & mut snp, & mut indel).unwrap();
        assert_eq!(summary.indel_positions, 1);
        assert!(snp.into_inner().unwrap().is_empty());

        let text = String::from_utf8(indel.into_inner().unwrap()).unwrap();
        let fields: Vec<&str> = text.trim_end().split('\t').collect();
        assert_eq!(&fields[3..5], &["C", "CAG"]);
        assert_eq!(fields[7], "ADP=20;STATUS=2");
    }
}
