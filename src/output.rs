//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::io::Write;
use itertools::Itertools;
use crate::classifier::{somatic_status_to_str, SomaticCall, SomaticStatus};
use crate::errors::{Result, VarcallError};
use crate::genotype::ConsensusCall;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Native,
    Vcf
}

pub fn output_format_to_str(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Native => "native",
        OutputFormat::Vcf => "vcf",
    }
}

pub fn str_to_output_format(s: &str) -> std::result::Result<OutputFormat, &'static str> {
    match s {
        "native" => Ok(OutputFormat::Native),
        "vcf" => Ok(OutputFormat::Vcf),
        _ => Err("Unknown output format string")
    }
}

pub const SOMATIC_NATIVE_HEADER: [&str; 23] = [
    "chrom", "position", "ref", "var",
    "normal_reads1", "normal_reads2", "normal_var_freq", "normal_gt",
    "tumor_reads1", "tumor_reads2", "tumor_var_freq", "tumor_gt",
    "somatic_status", "variant_p_value", "somatic_p_value",
    "tumor_reads1_plus", "tumor_reads1_minus", "tumor_reads2_plus", "tumor_reads2_minus",
    "normal_reads1_plus", "normal_reads1_minus", "normal_reads2_plus", "normal_reads2_minus"
];

pub const CONSENSUS_NATIVE_HEADER: [&str; 11] = [
    "Chrom", "Position", "Ref", "Var",
    "Cons:Cov:Reads1:Reads2:Freq:P-value",
    "StrandFilter:R1+:R1-:R2+:R2-:pval",
    "SamplesRef", "SamplesHet", "SamplesHom", "SamplesNC",
    "Cons:Cov:Reads1:Reads2:Freq:P-value"
];

pub fn somatic_vcf_header() -> String {
    let lines = [
        "##fileformat=VCFv4.1",
        "##source=varcall",
        r#"##INFO=<ID=DP,Number=1,Type=Integer,Description="Total depth of quality bases">"#,
        r#"##INFO=<ID=SOMATIC,Number=0,Type=Flag,Description="Indicates if record is a somatic mutation">"#,
        r#"##INFO=<ID=SS,Number=1,Type=String,Description="Somatic status of variant (0=Reference,1=Germline,2=Somatic,3=LOH, or 5=Unknown)">"#,
        r#"##INFO=<ID=SSC,Number=1,Type=String,Description="Somatic score in Phred scale (0-255) derived from somatic p-value">"#,
        r#"##INFO=<ID=GPV,Number=1,Type=Float,Description="Fisher's Exact Test P-value of tumor+normal versus no variant for Germline calls">"#,
        r#"##INFO=<ID=SPV,Number=1,Type=Float,Description="Fisher's Exact Test P-value of tumor versus normal for Somatic/LOH calls">"#,
        r#"##FILTER=<ID=str10,Description="Less than 10% or more than 90% of variant supporting reads on one strand">"#,
        r#"##FILTER=<ID=indelError,Description="Likely artifact due to indel reads at this position">"#,
        r#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#,
        r#"##FORMAT=<ID=GQ,Number=1,Type=Integer,Description="Genotype Quality">"#,
        r#"##FORMAT=<ID=DP,Number=1,Type=Integer,Description="Read Depth">"#,
        r#"##FORMAT=<ID=RD,Number=1,Type=Integer,Description="Depth of reference-supporting bases (reads1)">"#,
        r#"##FORMAT=<ID=AD,Number=1,Type=Integer,Description="Depth of variant-supporting bases (reads2)">"#,
        r#"##FORMAT=<ID=FREQ,Number=1,Type=String,Description="Variant allele frequency">"#,
        r#"##FORMAT=<ID=DP4,Number=1,Type=String,Description="Strand read counts: ref/fwd, ref/rev, var/fwd, var/rev">"#,
        "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNORMAL\tTUMOR"
    ];
    return lines.iter().map(|l| format!("{}\n", l)).collect();
}

pub fn trio_vcf_header(min_avg_qual: u8) -> String {
    let mut lines = vec![
        "##fileformat=VCFv4.1".to_owned(),
        "##source=varcall".to_owned(),
        format!(r#"##INFO=<ID=ADP,Number=1,Type=Integer,Description="Average per-sample depth of bases with Phred score >= {}">"#, min_avg_qual),
        r#"##INFO=<ID=STATUS,Number=1,Type=String,Description="Variant status in trio (1=untransmitted, 2=transmitted, 3=denovo, 4=MIE)">"#.to_owned(),
        r#"##INFO=<ID=DENOVO,Number=0,Type=Flag,Description="Indicates apparent de novo mutations unique to the child">"#.to_owned(),
        r#"##FILTER=<ID=str10,Description="Less than 10% or more than 90% of variant supporting reads on one strand">"#.to_owned(),
        r#"##FILTER=<ID=mendelError,Description="Apparent Mendelian inheritance error (MIE) in trio">"#.to_owned(),
        r#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Genotype">"#.to_owned(),
        r#"##FORMAT=<ID=GQ,Number=1,Type=Integer,Description="Genotype Quality">"#.to_owned(),
        r#"##FORMAT=<ID=SDP,Number=1,Type=Integer,Description="Raw Read Depth as reported by SAMtools">"#.to_owned(),
        format!(r#"##FORMAT=<ID=DP,Number=1,Type=Integer,Description="Quality Read Depth of bases with Phred score >= {}">"#, min_avg_qual),
        r#"##FORMAT=<ID=RD,Number=1,Type=Integer,Description="Depth of reference-supporting bases (reads1)">"#.to_owned(),
        r#"##FORMAT=<ID=AD,Number=1,Type=Integer,Description="Depth of variant-supporting bases (reads2)">"#.to_owned(),
        r#"##FORMAT=<ID=FREQ,Number=1,Type=String,Description="Variant allele frequency">"#.to_owned(),
        r#"##FORMAT=<ID=PVAL,Number=1,Type=String,Description="P-value from Fisher's Exact Test">"#.to_owned(),
        r#"##FORMAT=<ID=RBQ,Number=1,Type=Integer,Description="Average quality of reference-supporting bases (qual1)">"#.to_owned(),
        r#"##FORMAT=<ID=ABQ,Number=1,Type=Integer,Description="Average quality of variant-supporting bases (qual2)">"#.to_owned(),
        r#"##FORMAT=<ID=RDF,Number=1,Type=Integer,Description="Depth of reference-supporting bases on forward strand (reads1plus)">"#.to_owned(),
        r#"##FORMAT=<ID=RDR,Number=1,Type=Integer,Description="Depth of reference-supporting bases on reverse strand (reads1minus)">"#.to_owned(),
        r#"##FORMAT=<ID=ADF,Number=1,Type=Integer,Description="Depth of variant-supporting bases on forward strand (reads2plus)">"#.to_owned(),
        r#"##FORMAT=<ID=ADR,Number=1,Type=Integer,Description="Depth of variant-supporting bases on reverse strand (reads2minus)">"#.to_owned(),
    ];
    lines.push("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tFather\tMother\tChild".to_owned());
    return lines.iter().map(|l| format!("{}\n", l)).collect();
}

// p-values in scientific notation with at most four decimals, 3.3445E-3
pub fn format_p_value(p: f64) -> String {
    if !(p > 0.0) || !p.is_finite() {
        return "0E0".to_owned();
    }

    let mut exponent = p.log10().floor() as i32;
    let mut mantissa = (p / 10f64.powi(exponent) * 10000.0).round() / 10000.0;
    if mantissa >= 10.0 {
        mantissa /= 10.0;
        exponent += 1;
    }
    let m = format!("{:.4}", mantissa);
    return format!("{}E{}", m.trim_end_matches('0').trim_end_matches('.'), exponent);
}

// allele frequency as a percentage, 0.5 is written 50%
pub fn format_percent(freq: f64) -> String {
    let s = format!("{:.2}", freq * 100.0);
    return format!("{}%", s.trim_end_matches('0').trim_end_matches('.'));
}

fn genotype_field(call: &ConsensusCall) -> &'static str {
    if call.call.is_reference() {
        return "0/0";
    } else if call.call.is_heterozygous() {
        return "0/1";
    }
    return "1/1";
}

fn dp4(call: &ConsensusCall) -> String {
    return [call.reads1_plus, call.reads1_minus, call.reads2_plus, call.reads2_minus].iter().join(",");
}

pub fn somatic_native_fields(chrom: &str, position: u64, result: &SomaticCall) -> Vec<String> {
    let n = &result.normal;
    let t = &result.tumor;
    return vec![
        chrom.to_owned(), position.to_string(), result.ref_allele.to_string(), result.var_allele.clone(),
        n.reads1.to_string(), n.reads2.to_string(), format_percent(n.var_freq), n.call.code(),
        t.reads1.to_string(), t.reads2.to_string(), format_percent(t.var_freq), t.call.code(),
        somatic_status_to_str(result.status).to_owned(),
        format_p_value(result.germline_p), format_p_value(result.somatic_p),
        t.reads1_plus.to_string(), t.reads1_minus.to_string(), t.reads2_plus.to_string(), t.reads2_minus.to_string(),
        n.reads1_plus.to_string(), n.reads1_minus.to_string(), n.reads2_plus.to_string(), n.reads2_minus.to_string()
    ];
}

//
// REF and ALT columns, indels are written with the preceding reference base.
// With several alleles REF spans the longest deletion and every ALT is
// extended over the same bases.
//
pub fn vcf_alleles(ref_allele: char, var_alleles: &[String]) -> (String, String) {
    let longest_deletion = var_alleles.iter()
        .filter_map(|a| a.strip_prefix('-'))
        .max_by_key(|d| d.len())
        .unwrap_or("");

    let alt = var_alleles.iter().map(|a| {
        if let Some(inserted) = a.strip_prefix('+') {
            format!("{}{}{}", ref_allele, inserted, longest_deletion)
        } else if let Some(deleted) = a.strip_prefix('-') {
            format!("{}{}", ref_allele, longest_deletion.get(deleted.len()..).unwrap_or(""))
        } else {
            format!("{}{}", a, longest_deletion)
        }
    }).join(",");
    return (format!("{}{}", ref_allele, longest_deletion), alt);
}

pub fn somatic_vcf_fields(chrom: &str,
                          position: u64,
                          result: &SomaticCall,
                          normal_depth: u32,
                          tumor_depth: u32,
                          strand_filtered: bool) -> Vec<String>
{
    let (ref_column, alt_column) = vcf_alleles(result.ref_allele, &[result.var_allele.clone()]);

    let filter = if strand_filtered {
        "str10"
    } else if result.status == SomaticStatus::IndelFilter {
        "indelError"
    } else {
        "PASS"
    };

    let mut info = format!("DP={}", normal_depth + tumor_depth);
    if result.status == SomaticStatus::Somatic {
        info += ";SOMATIC";
    }
    info += &format!(";SS={};SSC={};GPV={};SPV={}",
                     result.status.ss_code(),
                     result.somatic_score(),
                     format_p_value(result.germline_p),
                     format_p_value(result.somatic_p));

    let sample = |call: &ConsensusCall, depth: u32| -> String {
        return format!("{}:.:{}:{}:{}:{}:{}", genotype_field(call), depth, call.reads1, call.reads2,
                       format_percent(call.var_freq), dp4(call));
    };

    return vec![
        chrom.to_owned(), position.to_string(), ".".to_owned(), ref_column, alt_column, ".".to_owned(),
        filter.to_owned(), info, "GT:GQ:DP:RD:AD:FREQ:DP4".to_owned(),
        sample(&result.normal, normal_depth), sample(&result.tumor, tumor_depth)
    ];
}

//
// Tab separated record output
//
pub struct RecordWriter<W: Write>
{
    out: csv::Writer<W>,
    records: usize
}

impl<W: Write> RecordWriter<W> {
    fn from_inner(inner: W) -> RecordWriter<W> {
        let out = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .flexible(true)
            .from_writer(inner);
        return RecordWriter { out: out, records: 0 };
    }

    pub fn somatic(mut inner: W, format: OutputFormat, headers: bool) -> Result<RecordWriter<W>> {
        if format == OutputFormat::Vcf && headers {
            inner.write_all(somatic_vcf_header().as_bytes())?;
        }
        let mut writer = RecordWriter::from_inner(inner);
        if format == OutputFormat::Native && headers {
            writer.out.write_record(&SOMATIC_NATIVE_HEADER)?;
        }
        return Ok(writer);
    }

    pub fn trio(mut inner: W, min_avg_qual: u8, headers: bool) -> Result<RecordWriter<W>> {
        if headers {
            inner.write_all(trio_vcf_header(min_avg_qual).as_bytes())?;
        }
        return Ok(RecordWriter::from_inner(inner));
    }

    pub fn consensus(inner: W, headers: bool) -> Result<RecordWriter<W>> {
        let mut writer = RecordWriter::from_inner(inner);
        if headers {
            writer.out.write_record(&CONSENSUS_NATIVE_HEADER)?;
        }
        return Ok(writer);
    }

    pub fn write_fields(& mut self, fields: &[String]) -> Result<()> {
        self.out.write_record(fields)?;
        self.records += 1;
        return Ok(());
    }

    // number of records written, not counting headers
    pub fn records(&self) -> usize {
        return self.records;
    }

    pub fn flush(& mut self) -> Result<()> {
        self.out.flush()?;
        return Ok(());
    }

    #[cfg(test)]
    pub fn into_inner(self) -> Result<W> {
        return self.out.into_inner().map_err(|e| VarcallError::Io(e.into_error()));
    }
}
