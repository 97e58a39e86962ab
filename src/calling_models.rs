//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use crate::pileup_stats::is_indel;

// Which kinds of variant allele the consensus caller may report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallingMode {
    Consensus,
    Snp,
    Indel
}

pub fn calling_mode_to_str(mode: CallingMode) -> &'static str {
    match mode {
        CallingMode::Consensus => "cns",
        CallingMode::Snp => "snp",
        CallingMode::Indel => "indel",
    }
}

pub fn str_to_calling_mode(s: &str) -> Result<CallingMode, &'static str> {
    match s {
        "cns" => Ok(CallingMode::Consensus),
        "snp" => Ok(CallingMode::Snp),
        "indel" => Ok(CallingMode::Indel),
        _ => Err("Unknown calling mode string")
    }
}

impl CallingMode {
    pub fn allows(&self, allele: &str) -> bool {
        match self {
            CallingMode::Consensus => true,
            CallingMode::Snp => !is_indel(allele),
            CallingMode::Indel => is_indel(allele)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_strings() {
        for m in [CallingMode::Consensus, CallingMode::Snp, CallingMode::Indel] {
            assert_eq!(str_to_calling_mode(calling_mode_to_str(m)), Ok(m));
        }
        assert!(str_to_calling_mode("pileup").is_err());
    }

    #[test]
    fn test_allows() {
        assert!(CallingMode::Snp.allows("T"));
        assert!(!CallingMode::Snp.allows("-AC"));
        assert!(CallingMode::Indel.allows("+G"));
        assert!(!CallingMode::Indel.allows("G"));
        assert!(CallingMode::Consensus.allows("+G"));
    }
}
