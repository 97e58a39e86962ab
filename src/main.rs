//---------------------------------------------------------
// Copyright 2022 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use clap::{App, SubCommand, Arg, ArgMatches, value_t};
use log::error;

mod calling_models;
mod classifier;
mod consensus_call;
mod coordinator;
mod errors;
mod genotype;
mod output;
mod parameters;
mod pileup;
mod pileup_stats;
mod significance;
mod somatic_call;
mod strand_filter;
mod summary;
mod trio;
mod utility;

use crate::calling_models::str_to_calling_mode;
use crate::consensus_call::{consensus_call, ConsensusOptions};
use crate::output::str_to_output_format;
use crate::parameters::{CallingParameters, SyncParameters, TrioParameters, str_to_chromosome_order};
use crate::somatic_call::{somatic_call, somatic_call_mpileup, SomaticOptions};
use crate::trio::trio_call;

// Thresholds shared by both subcommands
fn threshold_args<'a>(command: App<'a>) -> App<'a> {
    command
        .arg(Arg::with_name("min-coverage")
            .long("min-coverage")
            .takes_value(true)
            .help("minimum read depth at a position to make a call"))
        .arg(Arg::with_name("min-reads2")
            .long("min-reads2")
            .takes_value(true)
            .help("minimum supporting reads at a position to call variants"))
        .arg(Arg::with_name("min-avg-qual")
            .long("min-avg-qual")
            .takes_value(true)
            .help("minimum base quality at a position to count a read"))
        .arg(Arg::with_name("min-var-freq")
            .long("min-var-freq")
            .takes_value(true)
            .help("minimum variant allele frequency threshold"))
        .arg(Arg::with_name("min-freq-for-hom")
            .long("min-freq-for-hom")
            .takes_value(true)
            .help("minimum frequency to call homozygote"))
        .arg(Arg::with_name("p-value")
            .long("p-value")
            .takes_value(true)
            .help("p-value threshold for calling variants"))
        .arg(Arg::with_name("max-malformed")
            .long("max-malformed")
            .takes_value(true)
            .help("abort after this many malformed pileup lines"))
}

// Override the defaults with any thresholds given on the command line
fn apply_thresholds(matches: &ArgMatches, params: & mut CallingParameters, sync: & mut SyncParameters) -> anyhow::Result<()> {
    if matches.is_present("min-coverage") {
        params.min_coverage = value_t!(matches, "min-coverage", u32)?;
        params.min_coverage_normal = params.min_coverage;
        params.min_coverage_tumor = params.min_coverage;
    }
    if matches.is_present("min-reads2") {
        params.min_reads2 = value_t!(matches, "min-reads2", u32)?;
    }
    if matches.is_present("min-avg-qual") {
        params.min_avg_qual = value_t!(matches, "min-avg-qual", u8)?;
    }
    if matches.is_present("min-var-freq") {
        params.min_var_freq = value_t!(matches, "min-var-freq", f64)?;
    }
    if matches.is_present("min-freq-for-hom") {
        params.min_freq_for_hom = value_t!(matches, "min-freq-for-hom", f64)?;
    }
    if matches.is_present("p-value") {
        params.p_value = value_t!(matches, "p-value", f64)?;
    }
    if matches.is_present("max-malformed") {
        sync.max_malformed_records = value_t!(matches, "max-malformed", usize)?;
    }
    return Ok(());
}

fn run_somatic(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut params = CallingParameters::somatic_defaults();
    let mut sync = SyncParameters::defaults();
    apply_thresholds(matches, & mut params, & mut sync)?;

    if matches.is_present("min-coverage-normal") {
        params.min_coverage_normal = value_t!(matches, "min-coverage-normal", u32)?;
    }
    if matches.is_present("min-coverage-tumor") {
        params.min_coverage_tumor = value_t!(matches, "min-coverage-tumor", u32)?;
    }
    if matches.is_present("somatic-p-value") {
        params.somatic_p_value = value_t!(matches, "somatic-p-value", f64)?;
    }
    if matches.is_present("normal-purity") {
        params.set_normal_purity(value_t!(matches, "normal-purity", f64)?);
    }
    if matches.is_present("tumor-purity") {
        params.set_tumor_purity(value_t!(matches, "tumor-purity", f64)?);
    }
    params.strand_filter = matches.is_present("strand-filter");

    if matches.is_present("max-normal-resets") {
        sync.max_normal_resets = Some(value_t!(matches, "max-normal-resets", usize)?);
    }
    if let Some(order) = matches.value_of("chromosome-order") {
        sync.chromosome_order = str_to_chromosome_order(order).map_err(anyhow::Error::msg)?;
    }

    let format = str_to_output_format(matches.value_of("output-format").unwrap_or("native")).map_err(anyhow::Error::msg)?;
    let options = SomaticOptions {
        output_basename: matches.value_of("output-basename").unwrap_or("output").to_owned(),
        format: format,
        validation: matches.is_present("validation"),
        headers: !matches.is_present("no-headers")
    };

    if let Some(mpileup) = matches.value_of("mpileup") {
        return somatic_call_mpileup(mpileup, &options, &params, &sync);
    }

    match (matches.value_of("normal-pileup"), matches.value_of("tumor-pileup")) {
        (Some(normal), Some(tumor)) => somatic_call(normal, tumor, &options, &params, &sync),
        _ => Err(anyhow::anyhow!("somatic requires a normal and a tumor pileup, or --mpileup"))
    }
}

fn run_consensus(matches: &ArgMatches) -> anyhow::Result<()> {
    let variants_only = matches.is_present("variants");
    let mut params = CallingParameters::consensus_defaults(variants_only);
    let mut sync = SyncParameters::defaults();
    apply_thresholds(matches, & mut params, & mut sync)?;
    if matches.is_present("no-strand-filter") {
        params.strand_filter = false;
    }

    let mode = str_to_calling_mode(matches.value_of("calling-mode").unwrap_or("cns")).map_err(anyhow::Error::msg)?;
    let options = ConsensusOptions {
        mode: mode,
        variants_only: variants_only,
        headers: !matches.is_present("no-headers")
    };

    let mpileup = matches.value_of("mpileup").unwrap_or("-");
    return consensus_call(mpileup, matches.value_of("output"), &options, &params, &sync);
}

fn run_trio(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut params = TrioParameters::defaults();
    let mut sync = SyncParameters::defaults();
    apply_thresholds(matches, & mut params.calling, & mut sync)?;
    if matches.is_present("no-strand-filter") {
        params.calling.strand_filter = false;
    }
    if matches.is_present("adj-min-reads2") {
        params.relaxed_min_reads2 = value_t!(matches, "adj-min-reads2", u32)?;
    }
    if matches.is_present("adj-var-freq") {
        params.relaxed_min_var_freq = value_t!(matches, "adj-var-freq", f64)?;
    }
    if matches.is_present("adj-p-value") {
        params.relaxed_p_value = value_t!(matches, "adj-p-value", f64)?;
    }

    let mpileup = matches.value_of("mpileup").unwrap_or("-");
    let basename = matches.value_of("output-basename").unwrap_or("output");
    return trio_call(mpileup, basename, !matches.is_present("no-headers"), &params, &sync);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let somatic = SubCommand::with_name("somatic")
        .about("call germline, somatic and LOH variants from a normal and tumor pileup")
        .arg(Arg::with_name("normal-pileup")
            .index(1)
            .help("the normal pileup file"))
        .arg(Arg::with_name("tumor-pileup")
            .index(2)
            .help("the tumor pileup file, - for stdin"))
        .arg(Arg::with_name("mpileup")
            .long("mpileup")
            .takes_value(true)
            .conflicts_with_all(&["normal-pileup", "tumor-pileup"])
            .help("read the normal and tumor from one mpileup file"))
        .arg(Arg::with_name("output-basename")
            .short('o')
            .long("output-basename")
            .takes_value(true)
            .help("write calls to <basename>.snp and <basename>.indel"))
        .arg(Arg::with_name("output-format")
            .long("output-format")
            .takes_value(true)
            .possible_values(["native", "vcf"])
            .help("output format"))
        .arg(Arg::with_name("validation")
            .long("validation")
            .help("also write every compared position to <basename>.validation"))
        .arg(Arg::with_name("no-headers")
            .long("no-headers")
            .help("do not write header lines"))
        .arg(Arg::with_name("min-coverage-normal")
            .long("min-coverage-normal")
            .takes_value(true)
            .help("minimum read depth in the normal"))
        .arg(Arg::with_name("min-coverage-tumor")
            .long("min-coverage-tumor")
            .takes_value(true)
            .help("minimum read depth in the tumor"))
        .arg(Arg::with_name("somatic-p-value")
            .long("somatic-p-value")
            .takes_value(true)
            .help("p-value threshold for calling somatic and LOH sites"))
        .arg(Arg::with_name("normal-purity")
            .long("normal-purity")
            .takes_value(true)
            .help("purity of the normal sample, as a fraction or percentage"))
        .arg(Arg::with_name("tumor-purity")
            .long("tumor-purity")
            .takes_value(true)
            .help("purity of the tumor sample, as a fraction or percentage"))
        .arg(Arg::with_name("strand-filter")
            .long("strand-filter")
            .help("remove variants with extreme strand bias in the tumor"))
        .arg(Arg::with_name("chromosome-order")
            .long("chromosome-order")
            .takes_value(true)
            .possible_values(["file", "lexical", "natural"])
            .help("how chromosomes are ordered in the pileups"))
        .arg(Arg::with_name("max-normal-resets")
            .long("max-normal-resets")
            .takes_value(true)
            .help("abort after reading the normal pileup from the start this many times"));

    let consensus = SubCommand::with_name("mpileup2cns")
        .about("call consensus genotypes for every sample in an mpileup")
        .arg(Arg::with_name("mpileup")
            .index(1)
            .help("the mpileup file, stdin if omitted"))
        .arg(Arg::with_name("output")
            .short('o')
            .long("output")
            .takes_value(true)
            .help("output file, stdout if omitted"))
        .arg(Arg::with_name("calling-mode")
            .long("calling-mode")
            .takes_value(true)
            .possible_values(["cns", "snp", "indel"])
            .help("which kinds of variant to call"))
        .arg(Arg::with_name("variants")
            .long("variants")
            .help("report variant sites only"))
        .arg(Arg::with_name("no-strand-filter")
            .long("no-strand-filter")
            .help("do not fail variants with extreme strand bias"))
        .arg(Arg::with_name("no-headers")
            .long("no-headers")
            .help("do not write a header line"));

    let trio = SubCommand::with_name("trio")
        .about("call variants in a father, mother and child and flag de novo mutations")
        .arg(Arg::with_name("mpileup")
            .index(1)
            .help("the mpileup file with father, mother and child in that order, stdin if omitted"))
        .arg(Arg::with_name("output-basename")
            .short('o')
            .long("output-basename")
            .takes_value(true)
            .help("write calls to <basename>.snp.vcf and <basename>.indel.vcf"))
        .arg(Arg::with_name("adj-min-reads2")
            .long("adj-min-reads2")
            .takes_value(true)
            .help("minimum supporting reads when re-calling a de novo or inconsistent site"))
        .arg(Arg::with_name("adj-var-freq")
            .long("adj-var-freq")
            .takes_value(true)
            .help("minimum variant allele frequency when re-calling a site"))
        .arg(Arg::with_name("adj-p-value")
            .long("adj-p-value")
            .takes_value(true)
            .help("p-value threshold when re-calling a site"))
        .arg(Arg::with_name("no-strand-filter")
            .long("no-strand-filter")
            .help("do not fail variants with extreme strand bias"))
        .arg(Arg::with_name("no-headers")
            .long("no-headers")
            .help("do not write VCF headers"));

    let matches = App::new("varcall")
        .version("0.1")
        .author("Jared Simpson <jared.simpson@oicr.on.ca>")
        .about("Genotype and somatic variant calling from pileups")
        .subcommand(threshold_args(somatic))
        .subcommand(threshold_args(consensus))
        .subcommand(threshold_args(trio))
        .get_matches();

    let result = if let Some(matches) = matches.subcommand_matches("somatic") {
        run_somatic(matches)
    } else if let Some(matches) = matches.subcommand_matches("mpileup2cns") {
        run_consensus(matches)
    } else if let Some(matches) = matches.subcommand_matches("trio") {
        run_trio(matches)
    } else {
        Err(anyhow::anyhow!("a subcommand is required, see --help"))
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
