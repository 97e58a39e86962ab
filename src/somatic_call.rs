//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use anyhow::Context;
use log::{debug, info};

use crate::classifier::{classify, somatic_status_to_str, SomaticCall, SomaticStatus};
use crate::coordinator::{StreamCoordinator, SyncEvent};
use crate::errors::{Result, VarcallError};
use crate::output::{output_format_to_str, somatic_native_fields, somatic_vcf_fields, OutputFormat, RecordWriter};
use crate::parameters::{chromosome_order_to_str, CallingParameters, SyncParameters};
use crate::pileup::{MalformedBudget, MpileupRow, PileupRow, SampleEvidence};
use crate::strand_filter::fails_somatic_strand_filter;
use crate::summary::RunSummary;
use crate::utility::{open_line_source, FileLineSource, LineSource};

#[derive(Clone, Debug)]
pub struct SomaticOptions
{
    pub output_basename: String,
    pub format: OutputFormat,
    // also write every compared position to <basename>.validation
    pub validation: bool,
    pub headers: bool
}

// The files one somatic run writes to
pub struct SomaticOutputs<W: Write>
{
    format: OutputFormat,
    snp: RecordWriter<W>,
    indel: RecordWriter<W>,
    validation: Option<RecordWriter<W>>
}

impl<W: Write> SomaticOutputs<W> {
    pub fn new(format: OutputFormat, headers: bool, snp: W, indel: W, validation: Option<W>) -> Result<SomaticOutputs<W>> {
        let validation = match validation {
            Some(v) => Some(RecordWriter::somatic(v, format, headers)?),
            None => None
        };
        return Ok(SomaticOutputs {
            format: format,
            snp: RecordWriter::somatic(snp, format, headers)?,
            indel: RecordWriter::somatic(indel, format, headers)?,
            validation: validation
        });
    }

    //
    // Route one classified position. Every position goes to the validation
    // output when there is one. Reference and indel-filtered positions are not
    // written anywhere else, nor are positions failing the strand filter.
    //
    pub fn write(& mut self,
                 chrom: &str,
                 position: u64,
                 result: &SomaticCall,
                 normal_depth: u32,
                 tumor_depth: u32,
                 strand_filtered: bool) -> Result<()>
    {
        let fields = match self.format {
            OutputFormat::Native => somatic_native_fields(chrom, position, result),
            OutputFormat::Vcf => somatic_vcf_fields(chrom, position, result, normal_depth, tumor_depth, strand_filtered)
        };

        if let Some(v) = self.validation.as_mut() {
            v.write_fields(&fields)?;
        }

        if result.status == SomaticStatus::Reference || result.status == SomaticStatus::IndelFilter || strand_filtered {
            return Ok(());
        }

        if result.is_indel() {
            self.indel.write_fields(&fields)?;
        } else {
            self.snp.write_fields(&fields)?;
        }
        return Ok(());
    }

    pub fn finish(& mut self) -> Result<()> {
        debug!("wrote {} snp and {} indel records", self.snp.records(), self.indel.records());
        self.snp.flush()?;
        self.indel.flush()?;
        if let Some(v) = self.validation.as_mut() {
            v.flush()?;
        }
        return Ok(());
    }

    #[cfg(test)]
    pub fn into_inner(self) -> Result<(W, W, Option<W>)> {
        let validation = match self.validation {
            Some(v) => Some(v.into_inner()?),
            None => None
        };
        return Ok((self.snp.into_inner()?, self.indel.into_inner()?, validation));
    }
}

fn create_output(path: &str) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("could not create output file {}", path))?;
    return Ok(BufWriter::new(file));
}

fn open_outputs(options: &SomaticOptions) -> anyhow::Result<SomaticOutputs<BufWriter<File>>> {
    let suffix = match options.format {
        OutputFormat::Native => "",
        OutputFormat::Vcf => ".vcf"
    };
    let base = &options.output_basename;
    let snp = create_output(&format!("{}.snp{}", base, suffix))?;
    let indel = create_output(&format!("{}.indel{}", base, suffix))?;
    let validation = match options.validation {
        true => Some(create_output(&format!("{}.validation{}", base, suffix))?),
        false => None
    };
    return Ok(SomaticOutputs::new(options.format, options.headers, snp, indel, validation)?);
}

//
// Compare the normal and tumor evidence at one position and write the result
//
pub fn compare_position<W: Write>(chrom: &str,
                                  position: u64,
                                  ref_base: char,
                                  normal: &SampleEvidence,
                                  tumor: &SampleEvidence,
                                  line_number: u64,
                                  params: &CallingParameters,
                                  outputs: & mut SomaticOutputs<W>,
                                  summary: & mut RunSummary) -> Result<()>
{
    if normal.depth < params.min_coverage_normal || tumor.depth < params.min_coverage_tumor {
        return Ok(());
    }

    let normal_counts = normal.allele_counts(ref_base, params.min_avg_qual, line_number)?;
    let tumor_counts = tumor.allele_counts(ref_base, params.min_avg_qual, line_number)?;
    summary.compared_positions += 1;

    let result = classify(ref_base, &normal_counts, &tumor_counts, params);
    debug!("{}:{} {} by {}", chrom, position, somatic_status_to_str(result.status), result.rule);

    if result.status == SomaticStatus::NoCall {
        summary.record_call(result.status, false);
        return Ok(());
    }

    let t = &result.tumor;
    let strand_filtered = params.strand_filter &&
        fails_somatic_strand_filter(t.reads1_plus, t.reads1_minus, t.reads2_plus, t.reads2_minus);
    summary.record_call(result.status, strand_filtered);

    return outputs.write(chrom, position, &result, normal.depth, tumor.depth, strand_filtered);
}

// Malformed records are skipped until the budget runs out, anything else is fatal
fn skip_or_abort(outcome: Result<()>, budget: & mut MalformedBudget) -> Result<()> {
    match outcome {
        Ok(()) => return Ok(()),
        Err(e) => return budget.record(e)
    }
}

pub fn compare_streams<N: LineSource, T: LineSource, W: Write>(normal: N,
                                                               tumor: T,
                                                               params: &CallingParameters,
                                                               sync: &SyncParameters,
                                                               outputs: & mut SomaticOutputs<W>) -> Result<RunSummary>
{
    let mut summary = RunSummary::new();
    let mut coordinator = StreamCoordinator::new(normal, tumor, sync.clone())?;

    while let Some(event) = coordinator.next_event()? {
        match event {
            SyncEvent::Matched { normal, tumor } => {
                summary.tumor_positions += 1;
                summary.shared_positions += 1;

                let outcome = PileupRow::parse(&normal.text, normal.number)
                    .and_then(|n| PileupRow::parse(&tumor.text, tumor.number).map(|t| (n, t)))
                    .and_then(|(n, t)| compare_position(&t.chrom, t.position, t.ref_base, &n.sample, &t.sample,
                                                        tumor.number, params, outputs, & mut summary));
                skip_or_abort(outcome, coordinator.budget_mut())?;
            }
            SyncEvent::TumorOnly(_) => {
                summary.tumor_positions += 1;
            }
            SyncEvent::NormalReset { chrom, resets } => {
                debug!("normal reset {} while looking for {}", resets, chrom);
            }
        }
    }

    summary.normal_resets = coordinator.resets();
    summary.malformed = coordinator.budget_mut().count();
    outputs.finish()?;
    return Ok(summary);
}

pub fn compare_mpileup<S: LineSource, W: Write>(mut input: S,
                                                params: &CallingParameters,
                                                sync: &SyncParameters,
                                                outputs: & mut SomaticOutputs<W>) -> Result<RunSummary>
{
    let mut summary = RunSummary::new();
    let mut budget = MalformedBudget::new(sync.max_malformed_records);
    let mut line_number = 0;

    while let Some(line) = input.next_line().transpose() {
        line_number += 1;
        let outcome = line.and_then(|line| MpileupRow::parse(&line, line_number)).and_then(|row| {
            if row.samples.len() < 2 {
                return Err(VarcallError::malformed(line_number, "expected a normal and a tumor sample"));
            }
            summary.tumor_positions += 1;
            summary.shared_positions += 1;
            return compare_position(&row.chrom, row.position, row.ref_base, &row.samples[0], &row.samples[1],
                                    line_number, params, outputs, & mut summary);
        });
        skip_or_abort(outcome, & mut budget)?;
    }

    summary.malformed = budget.count();
    outputs.finish()?;
    return Ok(summary);
}

fn log_parameters(params: &CallingParameters, options: &SomaticOptions) -> () {
    info!("min coverage: {}x for normal, {}x for tumor", params.min_coverage_normal, params.min_coverage_tumor);
    info!("min reads2: {}", params.min_reads2);
    info!("min var freq: {}", params.min_var_freq);
    info!("min freq for hom: {}", params.min_freq_for_hom);
    info!("normal purity: {}", params.normal_purity);
    info!("tumor purity: {}", params.tumor_purity);
    info!("min avg qual: {}", params.min_avg_qual);
    info!("p-value threshold: {}", params.p_value);
    info!("somatic p-value: {}", params.somatic_p_value);
    info!("strand filter: {}", params.strand_filter);
    info!("writing {} output to {}.*", output_format_to_str(options.format), options.output_basename);
}

// Somatic calling from separate normal and tumor pileups
pub fn somatic_call(normal_pileup: &str,
                    tumor_pileup: &str,
                    options: &SomaticOptions,
                    params: &CallingParameters,
                    sync: &SyncParameters) -> anyhow::Result<()>
{
    params.validate()?;
    log_parameters(params, options);
    info!("chromosome order: {}", chromosome_order_to_str(sync.chromosome_order));

    // the normal stream may need to be read more than once
    let normal = FileLineSource::open(Path::new(normal_pileup))
        .with_context(|| format!("could not open normal pileup {}", normal_pileup))?;
    let tumor = open_line_source(tumor_pileup)
        .with_context(|| format!("could not open tumor pileup {}", tumor_pileup))?;

    let mut outputs = open_outputs(options)?;
    let summary = compare_streams(normal, tumor, params, sync, & mut outputs)?;
    summary.log(params.strand_filter);
    return Ok(());
}

// Somatic calling from one mpileup holding the normal then the tumor sample
pub fn somatic_call_mpileup(mpileup: &str,
                            options: &SomaticOptions,
                            params: &CallingParameters,
                            sync: &SyncParameters) -> anyhow::Result<()>
{
    params.validate()?;
    log_parameters(params, options);

    let input = open_line_source(mpileup).with_context(|| format!("could not open mpileup {}", mpileup))?;
    let mut outputs = open_outputs(options)?;
    let summary = compare_mpileup(input, params, sync, & mut outputs)?;
    summary.log(params.strand_filter);
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::MemoryLineSource;

    // ten reference reads on each strand
    const NORMAL_REF: &str = "20\t..........,,,,,,,,,,\tIIIIIIIIIIIIIIIIIIII";
    // five reference and five G reads on each strand
    const TUMOR_HET: &str = "20\t.....,,,,,GGGGGggggg\tIIIIIIIIIIIIIIIIIIII";
    // the G reads are all on the forward strand
    const TUMOR_BIASED: &str = "20\t.....,,,,,GGGGGGGGGG\tIIIIIIIIIIIIIIIIIIII";

    fn line(chrom: &str, position: u64, sample: &str) -> String {
        return format!("{}\t{}\tA\t{}", chrom, position, sample);
    }

    fn memory_outputs(format: OutputFormat, validation: bool) -> SomaticOutputs<Vec<u8>> {
        let v = if validation { Some(Vec::new()) } else { None };
        return SomaticOutputs::new(format, true, Vec::new(), Vec::new(), v).unwrap();
    }

    fn lines(buffer: Vec<u8>) -> Vec<String> {
        return String::from_utf8(buffer).unwrap().lines().map(|l| l.to_owned()).collect();
    }

    #[test]
    fn test_compare_streams() {
        let normal = [line("chr1", 100, NORMAL_REF), line("chr1", 200, NORMAL_REF), line("chr1", 300, NORMAL_REF)];
        let tumor = [line("chr1", 100, TUMOR_HET), line("chr1", 200, NORMAL_REF),
                     line("chr1", 300, TUMOR_BIASED), line("chr1", 400, TUMOR_HET)];
        let normal: Vec<&str> = normal.iter().map(|s| s.as_str()).collect();
        let tumor: Vec<&str> = tumor.iter().map(|s| s.as_str()).collect();

        let mut params = CallingParameters::somatic_defaults();
        params.strand_filter = true;
        let mut outputs = memory_outputs(OutputFormat::Native, false);
        let summary = compare_streams(MemoryLineSource::new(&normal), MemoryLineSource::new(&tumor),
                                      &params, &SyncParameters::defaults(), & mut outputs).unwrap();

        assert_eq!(summary.tumor_positions, 4);
        assert_eq!(summary.shared_positions, 3);
        assert_eq!(summary.compared_positions, 3);
        assert_eq!(summary.somatic, 1);
        assert_eq!(summary.reference, 1);
        assert_eq!(summary.strand_filter, 1);

        let (snp, indel, validation) = outputs.into_inner().unwrap();
        let snp = lines(snp);
        assert_eq!(snp.len(), 2);
        assert!(snp[0].starts_with("chrom\tposition"));
        assert!(snp[1].starts_with("chr1\t100\tA\tG\t20\t0\t0%\tA\t10\t10\t50%\tR\tSomatic\t"));
        assert_eq!(lines(indel).len(), 1);
        assert!(validation.is_none());
    }

    #[test]
    fn test_strand_filter_disabled() {
        let normal = line("chr1", 300, NORMAL_REF);
        let tumor = line("chr1", 300, TUMOR_BIASED);
        let params = CallingParameters::somatic_defaults();
        let mut outputs = memory_outputs(OutputFormat::Native, false);
        let summary = compare_streams(MemoryLineSource::new(&[&normal]), MemoryLineSource::new(&[&tumor]),
                                      &params, &SyncParameters::defaults(), & mut outputs).unwrap();
        assert_eq!(summary.strand_filter, 0);
        assert_eq!(summary.somatic, 1);
        let (snp, _, _) = outputs.into_inner().unwrap();
        assert_eq!(lines(snp).len(), 2);
    }

    #[test]
    fn test_low_coverage_not_compared() {
        let normal = line("chr1", 100, "4\t....\tIIII");
        let tumor = line("chr1", 100, TUMOR_HET);
        let mut outputs = memory_outputs(OutputFormat::Native, false);
        let summary = compare_streams(MemoryLineSource::new(&[&normal]), MemoryLineSource::new(&[&tumor]),
                                      &CallingParameters::somatic_defaults(), &SyncParameters::defaults(),
                                      & mut outputs).unwrap();
        assert_eq!(summary.shared_positions, 1);
        assert_eq!(summary.compared_positions, 0);
    }

    #[test]
    fn test_mpileup_validation_vcf() {
        let input = [
            format!("chr2\t10\tA\t{}\t{}", NORMAL_REF, TUMOR_HET),
            format!("chr2\t11\tA\t{}\t{}", NORMAL_REF, NORMAL_REF),
            // normal and tumor both carry a two base insertion
            "chr2\t12\tA\t10\t.....,+2ag,+2ag,+2ag,+2ag,+2ag\tIIIIIIIIII\t10\t.....,+2ag,+2ag,+2ag,+2ag,+2ag\tIIIIIIIIII".to_owned()
        ];
        let input: Vec<&str> = input.iter().map(|s| s.as_str()).collect();

        let mut outputs = memory_outputs(OutputFormat::Vcf, true);
        let summary = compare_mpileup(MemoryLineSource::new(&input), &CallingParameters::somatic_defaults(),
                                      &SyncParameters::defaults(), & mut outputs).unwrap();
        assert_eq!(summary.compared_positions, 3);
        assert_eq!(summary.germline, 1);

        let (snp, indel, validation) = outputs.into_inner().unwrap();
        let snp: Vec<String> = lines(snp).into_iter().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(snp.len(), 1);
        assert!(snp[0].starts_with("chr2\t10\t.\tA\tG\t.\tPASS\tDP=40;SOMATIC;SS=2;"));

        let indel: Vec<String> = lines(indel).into_iter().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(indel.len(), 1);
        assert!(indel[0].starts_with("chr2\t12\t.\tA\tAAG\t.\tPASS\tDP=20;SS=1;"));

        let validation: Vec<String> = lines(validation.unwrap()).into_iter().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(validation.len(), 3);
        assert!(validation[1].contains("SS=0"));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let mut input = vec![format!("chr2\t10\tA\t{}\t{}", NORMAL_REF, TUMOR_HET)];
        input.push("chr2\t11\tA\t1\t.\tI".to_owned());
        let input: Vec<&str> = input.iter().map(|s| s.as_str()).collect();
        let mut outputs = memory_outputs(OutputFormat::Native, false);
        let summary = compare_mpileup(MemoryLineSource::new(&input), &CallingParameters::somatic_defaults(),
                                      &SyncParameters::defaults(), & mut outputs).unwrap();
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.somatic, 1);

        let bad = vec!["x"; 5];
        let mut outputs = memory_outputs(OutputFormat::Native, false);
        match compare_mpileup(MemoryLineSource::new(&bad), &CallingParameters::somatic_defaults(),
                              &SyncParameters::defaults(), & mut outputs) {
            Err(VarcallError::TooManyMalformedRecords { count }) => assert_eq!(count, 5),
            other => panic!("unexpected result {:?}", other.map(|s| s.compared_positions))
        }
    }

    #[test]
    fn test_somatic_call_files() {
        let dir = tempfile::tempdir().unwrap();
        let normal_path = dir.path().join("normal.pileup");
        let tumor_path = dir.path().join("tumor.pileup");
        std::fs::write(&normal_path, format!("{}\n", line("chr1", 100, NORMAL_REF))).unwrap();
        std::fs::write(&tumor_path, format!("{}\n", line("chr1", 100, TUMOR_HET))).unwrap();

        let basename = dir.path().join("out").to_string_lossy().to_string();
        let options = SomaticOptions { output_basename: basename.clone(), format: OutputFormat::Native,
                                       validation: false, headers: true };
        somatic_call(normal_path.to_str().unwrap(), tumor_path.to_str().unwrap(), &options,
                     &CallingParameters::somatic_defaults(), &SyncParameters::defaults()).unwrap();

        let snp = std::fs::read_to_string(format!("{}.snp", basename)).unwrap();
        assert_eq!(snp.lines().count(), 2);
        assert!(snp.contains("\tSomatic\t"));
        let indel = std::fs::read_to_string(format!("{}.indel", basename)).unwrap();
        assert_eq!(indel.lines().count(), 1);
    }
}
