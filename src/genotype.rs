//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use crate::pileup_stats::{AlleleCounts, AlleleStats, is_indel};
use crate::calling_models::CallingMode;
use crate::significance::significance_vs_even_split;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Genotype {
    NoCall,
    Reference(char),
    HetSnv { reference: char, alt: char },
    HomSnv(char),
    HetIndel(String),
    HomIndel(String)
}

impl Genotype {
    // The short code used in native output, IUPAC for heterozygous SNVs.
    // A heterozygote with no IUPAC code (ambiguous reference base) is
    // written as ref/alt.
    pub fn code(&self) -> String {
        match self {
            Genotype::NoCall => "N".to_owned(),
            Genotype::Reference(r) => r.to_string(),
            Genotype::HetSnv { reference, alt } => match iupac(*reference, *alt) {
                'N' => format!("{}/{}", reference, alt),
                code => code.to_string()
            },
            Genotype::HomSnv(a) => a.to_string(),
            Genotype::HetIndel(a) => format!("*/{}", a),
            Genotype::HomIndel(a) => format!("{}/{}", a, a)
        }
    }

    pub fn is_heterozygous(&self) -> bool {
        return matches!(self, Genotype::HetSnv { .. } | Genotype::HetIndel(_));
    }

    pub fn is_homozygous(&self) -> bool {
        return matches!(self, Genotype::HomSnv(_) | Genotype::HomIndel(_));
    }

    pub fn is_reference(&self) -> bool {
        return matches!(self, Genotype::Reference(_));
    }

    pub fn is_indel(&self) -> bool {
        return matches!(self, Genotype::HetIndel(_) | Genotype::HomIndel(_));
    }

    pub fn is_variant(&self) -> bool {
        return self.is_heterozygous() || self.is_homozygous();
    }

    // The non-reference allele carried by this genotype, the reference base
    // for reference calls and None for no-calls
    pub fn allele(&self) -> Option<String> {
        match self {
            Genotype::NoCall => None,
            Genotype::Reference(r) => Some(r.to_string()),
            Genotype::HetSnv { alt, .. } => Some(alt.to_string()),
            Genotype::HomSnv(a) => Some(a.to_string()),
            Genotype::HetIndel(a) | Genotype::HomIndel(a) => Some(a.clone())
        }
    }
}

pub fn iupac(a: char, b: char) -> char {
    let mut pair = [a.to_ascii_uppercase(), b.to_ascii_uppercase()];
    pair.sort_unstable();
    match pair {
        ['A', 'G'] => 'R',
        ['C', 'T'] => 'Y',
        ['G', 'T'] => 'K',
        ['A', 'C'] => 'M',
        ['C', 'G'] => 'S',
        ['A', 'T'] => 'W',
        [x, y] if x == y => x,
        _ => 'N'
    }
}

// One sample's genotype call at one position along with the read
// evidence for the reference and variant alleles
#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusCall
{
    pub call: Genotype,
    pub reads1: u32,
    pub reads2: u32,
    pub var_freq: f64,
    pub strands1: u8,
    pub strands2: u8,
    pub qual1: f64,
    pub qual2: f64,
    pub p_value: f64,
    pub map_qual1: f64,
    pub map_qual2: f64,
    pub reads1_plus: u32,
    pub reads1_minus: u32,
    pub reads2_plus: u32,
    pub reads2_minus: u32,
    pub variant_allele: Option<String>,
    // 1-based discovery order of the variant allele among the non-reference alleles
    pub allele_index: usize
}

impl ConsensusCall {
    pub fn no_call() -> ConsensusCall {
        ConsensusCall {
            call: Genotype::NoCall,
            reads1: 0,
            reads2: 0,
            var_freq: 0.0,
            strands1: 0,
            strands2: 0,
            qual1: 0.0,
            qual2: 0.0,
            p_value: 1.0,
            map_qual1: 0.0,
            map_qual2: 0.0,
            reads1_plus: 0,
            reads1_minus: 0,
            reads2_plus: 0,
            reads2_minus: 0,
            variant_allele: None,
            allele_index: 0
        }
    }

    pub fn depth(&self) -> u32 {
        return self.reads1 + self.reads2;
    }

    // Replace the variant side of the evidence with the reads supporting another allele
    pub fn set_variant_evidence(& mut self, allele: &str, stats: Option<&AlleleStats>) -> () {
        let default = AlleleStats::default();
        let s = stats.unwrap_or(&default);
        self.reads2 = s.reads;
        self.reads2_plus = s.reads_plus;
        self.reads2_minus = s.reads_minus;
        self.strands2 = s.strands();
        self.qual2 = s.avg_base_qual();
        self.map_qual2 = s.avg_map_qual();
        self.var_freq = variant_frequency(self.reads1, self.reads2);
        self.variant_allele = Some(allele.to_owned());
    }
}

pub fn variant_frequency(reads1: u32, reads2: u32) -> f64 {
    if reads1 + reads2 == 0 {
        return 0.0;
    }
    return reads2 as f64 / (reads1 + reads2) as f64;
}

//
// Call the genotype of one sample from its allele evidence. The first call
// returned is the best supported one, any further calls are the remaining
// qualifying indel alleles in the order they were observed.
//
pub fn call_consensus(ref_base: char,
                      counts: &AlleleCounts,
                      mode: CallingMode,
                      min_reads2: u32,
                      min_var_freq: f64,
                      min_avg_qual: u8,
                      min_freq_for_hom: f64) -> Vec<ConsensusCall>
{
    if counts.total_reads() == 0 {
        return vec![ConsensusCall::no_call()];
    }

    let ref_base = ref_base.to_ascii_uppercase();
    let reference = ref_base.to_string();
    let ref_default = AlleleStats::default();
    let ref_stats = counts.get(&reference).unwrap_or(&ref_default);
    let reads1 = ref_stats.reads;

    // non-reference alleles, with their discovery index
    let variants: Vec<(usize, &str, &AlleleStats)> = counts.iter()
        .filter(|(a, _)| *a != reference.as_str() && *a != "N")
        .enumerate()
        .map(|(i, (a, s))| (i + 1, a, s))
        .collect();

    let mut candidates: Vec<&(usize, &str, &AlleleStats)> = variants.iter()
        .filter(|(_, a, s)| mode.allows(a) &&
                            s.reads >= min_reads2 &&
                            variant_frequency(reads1, s.reads) >= min_var_freq &&
                            s.avg_base_qual() >= min_avg_qual as f64)
        .collect();
    candidates.sort_by(|x, y| y.2.reads.cmp(&x.2.reads).then_with(|| x.1.cmp(&y.1)));

    let base_call = |index: usize, allele: &str, stats: &AlleleStats| -> ConsensusCall {
        let mut c = ConsensusCall::no_call();
        c.reads1 = reads1;
        c.reads1_plus = ref_stats.reads_plus;
        c.reads1_minus = ref_stats.reads_minus;
        c.strands1 = ref_stats.strands();
        c.qual1 = ref_stats.avg_base_qual();
        c.map_qual1 = ref_stats.avg_map_qual();
        c.set_variant_evidence(allele, Some(stats));
        c.allele_index = index;
        c.p_value = significance_vs_even_split(c.reads1, c.reads2);
        return c;
    };

    if candidates.is_empty() {
        // report the strongest non-reference allele alongside the reference call
        let best_other = variants.iter()
            .filter(|(_, a, _)| mode.allows(a))
            .max_by(|x, y| x.2.reads.cmp(&y.2.reads).then_with(|| y.1.cmp(&x.1)));

        let mut c = match best_other {
            Some((i, a, s)) => base_call(*i, a, s),
            None => base_call(0, "", &AlleleStats::default())
        };
        if best_other.is_none() {
            c.variant_allele = None;
        }

        if reads1 >= min_reads2.max(1) {
            c.call = Genotype::Reference(ref_base);
        } else {
            c.call = Genotype::NoCall;
        }
        return vec![c];
    }

    let make_variant_call = |index: usize, allele: &str, stats: &AlleleStats| -> ConsensusCall {
        let mut c = base_call(index, allele, stats);
        let hom = c.var_freq >= min_freq_for_hom;
        c.call = match (is_indel(allele), hom) {
            (true, true) => Genotype::HomIndel(allele.to_owned()),
            (true, false) => Genotype::HetIndel(allele.to_owned()),
            (false, true) => Genotype::HomSnv(first_char(allele)),
            (false, false) => Genotype::HetSnv { reference: ref_base, alt: first_char(allele) }
        };
        return c;
    };

    let (best_index, best_allele, best_stats) = candidates[0];
    let mut calls = vec![make_variant_call(*best_index, best_allele, best_stats)];

    let mut extra: Vec<&&(usize, &str, &AlleleStats)> = candidates[1..].iter()
        .filter(|(_, a, _)| is_indel(a))
        .collect();
    extra.sort_by_key(|(i, _, _)| *i);
    for (i, a, s) in extra {
        calls.push(make_variant_call(*i, a, s));
    }
    return calls;
}

fn first_char(s: &str) -> char {
    return s.chars().next().unwrap_or('N');
}
