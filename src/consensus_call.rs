//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::fs::File;
use std::io::{self, BufWriter, Write};
use anyhow::Context;
use itertools::Itertools;
use log::{debug, info};

use crate::calling_models::{calling_mode_to_str, CallingMode};
use crate::errors::Result;
use crate::genotype::{call_consensus, ConsensusCall, Genotype};
use crate::output::{format_p_value, format_percent, RecordWriter};
use crate::parameters::{CallingParameters, SyncParameters};
use crate::pileup::{MalformedBudget, MpileupRow};
use crate::pileup_stats::{is_indel, AlleleCounts};
use crate::significance::significance;
use crate::strand_filter::strand_filter;
use crate::summary::ConsensusSummary;
use crate::utility::{open_line_source, LineSource};

#[derive(Clone, Debug)]
pub struct ConsensusOptions
{
    pub mode: CallingMode,
    // report variant sites only
    pub variants_only: bool,
    pub headers: bool
}

impl ConsensusOptions {
    // true when only some kinds of site are reported
    pub fn restricted(&self) -> bool {
        return self.variants_only || self.mode != CallingMode::Consensus;
    }
}

// The calls made at one mpileup position
#[derive(Clone, Debug, PartialEq)]
pub struct SiteReport
{
    pub fields: Vec<String>,
    // per-sample genotypes using allele numbers, 0/1 or 1/1 or ./.
    pub genotypes: Vec<String>,
    pub covered: bool,
    pub variant: bool,
    pub snp: bool,
    pub indel: bool,
    pub strand_failed: bool
}

// Variant alleles numbered in the order they were first called at a site
struct AlleleNumbering
{
    alleles: Vec<String>
}

impl AlleleNumbering {
    fn number(& mut self, allele: &str) -> usize {
        if let Some(i) = self.alleles.iter().position(|a| a == allele) {
            return i + 1;
        }
        self.alleles.push(allele.to_owned());
        return self.alleles.len();
    }
}

//
// Confidence of a variant call, the variant reads tested against a sample
// of the same depth without any variant reads
//
fn variant_p_value(call: &ConsensusCall) -> f64 {
    return significance(call.depth(), 0, call.reads1, call.reads2);
}

// Best call for one sample or for the pooled samples. Variant calls that are not
// significant are reported as reference.
pub fn call_sample(ref_base: char, counts: &AlleleCounts, params: &CallingParameters, mode: CallingMode) -> ConsensusCall {
    let mut calls = call_consensus(ref_base, counts, mode, params.min_reads2, params.min_var_freq,
                                   params.min_avg_qual, params.min_freq_for_hom);
    let mut call = calls.swap_remove(0);
    call.p_value = variant_p_value(&call);
    if call.call.is_variant() && call.p_value > params.p_value {
        call.call = Genotype::Reference(ref_base);
    }
    return call;
}

fn call_string(call: &ConsensusCall, quality_depth: u32) -> String {
    return format!("{}:{}:{}:{}:{}:{}", call.call.code(), quality_depth, call.reads1, call.reads2,
                   format_percent(call.var_freq), format_p_value(call.p_value));
}

fn uncalled_string(quality_depth: u32) -> String {
    return format!("N:{}:-:-:-:-", quality_depth);
}

pub fn call_site(row: &MpileupRow, line_number: u64, params: &CallingParameters, mode: CallingMode) -> Result<SiteReport> {
    let ref_base = row.ref_base;
    let mut numbering = AlleleNumbering { alleles: Vec::new() };

    let mut report = SiteReport {
        fields: Vec::new(),
        genotypes: Vec::new(),
        covered: false,
        variant: false,
        snp: false,
        indel: false,
        strand_failed: false
    };

    let (mut samples_ref, mut samples_het, mut samples_hom, mut samples_nc) = (0, 0, 0, 0);
    let mut strands = [0u32; 4];
    let mut sample_strings = Vec::new();
    let mut pooled = AlleleCounts::new();
    let mut pooled_depth = 0;
    let mut pooled_quality_depth = 0;

    for sample in row.samples.iter() {
        let counts = sample.allele_counts(ref_base, params.min_avg_qual, line_number)?;
        let quality_depth = sample.quality_depth(params.min_avg_qual);
        pooled.merge(&counts);
        pooled_depth += sample.depth;
        pooled_quality_depth += quality_depth;

        if sample.depth < params.min_coverage || quality_depth < params.min_coverage {
            samples_nc += 1;
            sample_strings.push(uncalled_string(quality_depth));
            report.genotypes.push("./.".to_owned());
            continue;
        }
        report.covered = true;

        let call = call_sample(ref_base, &counts, params, mode);
        if call.call == Genotype::NoCall {
            samples_nc += 1;
            sample_strings.push(uncalled_string(quality_depth));
            report.genotypes.push("./.".to_owned());
            continue;
        }

        sample_strings.push(call_string(&call, quality_depth));
        if !call.call.is_variant() {
            samples_ref += 1;
            report.genotypes.push("0/0".to_owned());
            continue;
        }

        let allele = call.variant_allele.clone().unwrap_or_default();
        let number = numbering.number(&allele);
        if call.call.is_homozygous() {
            samples_hom += 1;
            report.genotypes.push(format!("{}/{}", number, number));
        } else {
            samples_het += 1;
            report.genotypes.push(format!("0/{}", number));
        }

        report.variant = true;
        if call.call.is_indel() {
            report.indel = true;
        } else {
            report.snp = true;
        }
        strands[0] += call.reads1_plus;
        strands[1] += call.reads1_minus;
        strands[2] += call.reads2_plus;
        strands[3] += call.reads2_minus;
    }

    let mut consensus = uncalled_string(pooled_quality_depth);
    if pooled_depth >= params.min_coverage && pooled_quality_depth >= params.min_coverage {
        report.covered = true;
        let call = call_sample(ref_base, &pooled, params, mode);
        if call.call != Genotype::NoCall {
            consensus = call_string(&call, pooled_quality_depth);
        }
        if call.call.is_variant() {
            if let Some(allele) = &call.variant_allele {
                numbering.number(allele);
                report.indel |= is_indel(allele);
                report.snp |= !is_indel(allele);
            }
            report.variant = true;
        }
    }

    let var_bases = match numbering.alleles.is_empty() {
        true => ".".to_owned(),
        false => numbering.alleles.iter().join(",")
    };

    let mut strand_p_value = 1.0;
    if params.strand_filter && report.variant && strands.iter().any(|&n| n > 0) {
        let result = strand_filter(strands[0], strands[1], strands[2], strands[3]);
        strand_p_value = result.p_value;
        report.strand_failed = !result.passed;
    }
    let status = if report.strand_failed { "Fail" } else { "Pass" };
    let strand_status = format!("{}:{}:{}", status, strands.iter().join(":"), format_p_value(strand_p_value));

    report.fields = vec![
        row.chrom.clone(), row.position.to_string(), ref_base.to_string(), var_bases,
        consensus, strand_status,
        samples_ref.to_string(), samples_het.to_string(), samples_hom.to_string(), samples_nc.to_string(),
        sample_strings.join(" ")
    ];
    return Ok(report);
}

//
// Whether a site is written. Reporting all sites includes those failing the
// strand filter, reporting variants only leaves them out.
//
pub fn should_report(report: &SiteReport, options: &ConsensusOptions, strand_filter_enabled: bool) -> bool {
    if report.variant && strand_filter_enabled && report.strand_failed {
        return !options.restricted();
    }
    if !options.restricted() {
        return true;
    }

    match options.mode {
        CallingMode::Consensus => return report.variant,
        CallingMode::Snp => return report.snp,
        CallingMode::Indel => return report.indel
    }
}

pub fn call_mpileup<S: LineSource, W: Write>(mut input: S,
                                             options: &ConsensusOptions,
                                             params: &CallingParameters,
                                             sync: &SyncParameters,
                                             writer: & mut RecordWriter<W>) -> Result<ConsensusSummary>
{
    let mut summary = ConsensusSummary::new();
    let mut budget = MalformedBudget::new(sync.max_malformed_records);
    let mut line_number = 0;

    while let Some(line) = input.next_line().transpose() {
        line_number += 1;
        let report = match line.and_then(|line| MpileupRow::parse(&line, line_number))
                               .and_then(|row| call_site(&row, line_number, params, options.mode)) {
            Ok(r) => r,
            Err(e) => {
                budget.record(e)?;
                continue;
            }
        };

        summary.positions += 1;
        if report.covered {
            summary.covered_positions += 1;
        }
        if report.variant {
            summary.variant_positions += 1;
        }
        if report.snp {
            summary.snp_positions += 1;
        }
        if report.indel {
            summary.indel_positions += 1;
        }
        if report.strand_failed {
            summary.strand_filtered += 1;
        }

        if should_report(&report, options, params.strand_filter) {
            debug!("{}:{} {}", report.fields[0], report.fields[1], report.fields[4]);
            writer.write_fields(&report.fields)?;
            summary.reported += 1;
        }
    }

    summary.malformed = budget.count();
    writer.flush()?;
    return Ok(summary);
}

pub fn consensus_call(mpileup: &str,
                      output: Option<&str>,
                      options: &ConsensusOptions,
                      params: &CallingParameters,
                      sync: &SyncParameters) -> anyhow::Result<()>
{
    params.validate()?;
    info!("calling mode: {}{}", calling_mode_to_str(options.mode), if options.variants_only { " (variants only)" } else { "" });
    info!("min coverage: {}", params.min_coverage);
    info!("min reads2: {}", params.min_reads2);
    info!("min var freq: {}", params.min_var_freq);
    info!("min avg qual: {}", params.min_avg_qual);
    info!("p-value threshold: {}", params.p_value);
    info!("strand filter: {}", params.strand_filter);

    let input = open_line_source(mpileup).with_context(|| format!("could not open mpileup {}", mpileup))?;
    let out: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("could not create output file {}", path))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout()))
    };

    let mut writer = RecordWriter::consensus(out, options.headers)?;
    let summary = call_mpileup(input, options, params, sync, & mut writer)?;
    summary.log();
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::{FileLineSource, MemoryLineSource};

    fn quals(n: usize) -> String {
        return "I".repeat(n);
    }

    fn site(line: &str, params: &CallingParameters, mode: CallingMode) -> SiteReport {
        let row = MpileupRow::parse(line, 1).unwrap();
        return call_site(&row, 1, params, mode).unwrap();
    }

    fn options(mode: CallingMode, variants_only: bool) -> ConsensusOptions {
        return ConsensusOptions { mode: mode, variants_only: variants_only, headers: false };
    }

    #[test]
    fn test_two_sample_site() {
        let line = format!("chr1\t100\tA\t20\t.....,,,,,GGGGGggggg\t{}\t20\t..........,,,,,,,,,,\t{}", quals(20), quals(20));
        let r = site(&line, &CallingParameters::defaults(), CallingMode::Consensus);

        assert_eq!(&r.fields[0..4], &["chr1", "100", "A", "G"]);
        assert!(r.fields[4].starts_with("R:40:30:10:25%:"));
        assert_eq!(r.fields[5], "Pass:5:5:5:5:1E0");
        assert_eq!(&r.fields[6..10], &["1", "1", "0", "0"]);
        assert_eq!(r.fields[10], "R:20:10:10:50%:4.3592E-4 A:20:20:0:0%:1E0");
        assert_eq!(r.genotypes, vec!["0/1", "0/0"]);
        assert!(r.variant && r.snp && !r.indel && r.covered);
    }

    #[test]
    fn test_allele_numbering() {
        let line = format!("chr1\t7\tC\t20\t..........TTTTTTTTTT\t{}\t20\t..........GGGGGGGGGG\t{}", quals(20), quals(20));
        let r = site(&line, &CallingParameters::defaults(), CallingMode::Consensus);
        assert_eq!(r.fields[3], "T,G");
        assert_eq!(r.genotypes, vec!["0/1", "0/2"]);
    }

    #[test]
    fn test_uncovered_sample() {
        let line = format!("chr1\t100\tA\t3\t.,.\t{}", quals(3));
        let r = site(&line, &CallingParameters::defaults(), CallingMode::Consensus);
        assert_eq!(r.fields[3], ".");
        assert_eq!(r.fields[4], "N:3:-:-:-:-");
        assert_eq!(r.fields[9], "1");
        assert_eq!(r.fields[10], "N:3:-:-:-:-");
        assert!(!r.covered);

        assert!(should_report(&r, &options(CallingMode::Consensus, false), true));
        assert!(!should_report(&r, &options(CallingMode::Consensus, true), true));
    }

    #[test]
    fn test_strand_filter_failure() {
        let mut params = CallingParameters::defaults();
        params.strand_filter = true;
        let line = format!("chr1\t100\tA\t40\t..........,,,,,,,,,,GGGGGGGGGGGGGGGGGGGG\t{}", quals(40));
        let r = site(&line, &params, CallingMode::Consensus);
        assert!(r.strand_failed);
        assert!(r.fields[5].starts_with("Fail:10:10:20:0:"));

        assert!(should_report(&r, &options(CallingMode::Consensus, false), true));
        assert!(!should_report(&r, &options(CallingMode::Consensus, true), true));
        assert!(!should_report(&r, &options(CallingMode::Snp, false), true));
    }

    #[test]
    fn test_calling_modes() {
        let line = "chr1\t5\tA\t10\t.....,+2ag,+2ag,+2ag,+2ag,+2ag\tIIIIIIIIII";

        let indel = site(line, &CallingParameters::defaults(), CallingMode::Indel);
        assert_eq!(indel.fields[3], "+AG");
        assert!(indel.fields[10].starts_with("*/+AG:10:5:5:50%:"));
        assert!(indel.indel && !indel.snp);
        assert!(should_report(&indel, &options(CallingMode::Indel, false), false));

        let snp = site(line, &CallingParameters::defaults(), CallingMode::Snp);
        assert!(!snp.variant);
        assert_eq!(snp.fields[3], ".");
        assert!(!should_report(&snp, &options(CallingMode::Snp, false), false));
    }

    #[test]
    fn test_call_mpileup() {
        let good = format!("chr1\t100\tA\t20\t.....,,,,,GGGGGggggg\t{}", quals(20));
        let reference = format!("chr1\t101\tA\t20\t..........,,,,,,,,,,\t{}", quals(20));
        let input = [good.as_str(), "chr1\tbad", reference.as_str()];

        let opts = ConsensusOptions { mode: CallingMode::Consensus, variants_only: true, headers: true };
        let mut writer = RecordWriter::consensus(Vec::new(), opts.headers).unwrap();
        let summary = call_mpileup(MemoryLineSource::new(&input), &opts, &CallingParameters::defaults(),
                                   &SyncParameters::defaults(), & mut writer).unwrap();
        assert_eq!(summary.positions, 2);
        assert_eq!(summary.variant_positions, 1);
        assert_eq!(summary.reported, 1);
        assert_eq!(summary.malformed, 1);

        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Chrom\tPosition\tRef\tVar\t"));
        assert!(lines[1].starts_with("chr1\t100\tA\tG\t"));
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(format!("chr1\t100\tA\t20\t.....,,,,,GGGGGggggg\t{}\n", quals(20)).as_bytes()).unwrap();
        file.write_all(b"chr1\t101\tA\t2\t.\xc3\tII\n").unwrap();
        file.write_all(format!("chr1\t102\tA\t20\t..........,,,,,,,,,,\t{}\n", quals(20)).as_bytes()).unwrap();
        file.flush().unwrap();

        let opts = options(CallingMode::Consensus, false);
        let mut writer = RecordWriter::consensus(Vec::new(), false).unwrap();
        let source = FileLineSource::open(file.path()).unwrap();
        let summary = call_mpileup(source, &opts, &CallingParameters::defaults(),
                                   &SyncParameters::defaults(), & mut writer).unwrap();
        assert_eq!(summary.positions, 2);
        assert_eq!(summary.malformed, 1);

        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("chr1\t100\t"));
        assert!(lines[1].starts_with("chr1\t102\t"));
    }
}
