//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use log::info;
use crate::classifier::SomaticStatus;
use crate::trio::{trio_status_to_str, TrioStatus};

// Counters for a tumor/normal comparison run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary
{
    pub tumor_positions: usize,
    pub shared_positions: usize,
    pub compared_positions: usize,
    pub reference: usize,
    pub germline: usize,
    pub somatic: usize,
    pub loh: usize,
    pub unknown: usize,
    pub indel_filter: usize,
    pub no_call: usize,
    pub strand_filter: usize,
    pub malformed: usize,
    pub normal_resets: usize
}

impl RunSummary {
    pub fn new() -> RunSummary {
        return RunSummary::default();
    }

    // strand filtered sites are counted instead of their status
    pub fn record_call(& mut self, status: SomaticStatus, strand_filtered: bool) -> () {
        if strand_filtered && status != SomaticStatus::Reference && status != SomaticStatus::IndelFilter {
            self.strand_filter += 1;
            return;
        }

        match status {
            SomaticStatus::Reference => self.reference += 1,
            SomaticStatus::Germline => self.germline += 1,
            SomaticStatus::Somatic => self.somatic += 1,
            SomaticStatus::Loh => self.loh += 1,
            SomaticStatus::Unknown => self.unknown += 1,
            SomaticStatus::IndelFilter => self.indel_filter += 1,
            SomaticStatus::NoCall => self.no_call += 1
        }
    }

    pub fn log(&self, strand_filter_enabled: bool) -> () {
        info!("{} positions in tumor", self.tumor_positions);
        info!("{} positions shared in normal", self.shared_positions);
        info!("{} had sufficient coverage for comparison", self.compared_positions);
        info!("{} were called Reference", self.reference);
        info!("{} were mixed SNP-indel calls and filtered", self.indel_filter);
        if strand_filter_enabled {
            info!("{} were removed by the strand filter", self.strand_filter);
        }
        info!("{} were called Germline", self.germline);
        info!("{} were called LOH", self.loh);
        info!("{} were called Somatic", self.somatic);
        info!("{} were called Unknown", self.unknown);
        info!("{} could not be called", self.no_call);
        if self.malformed > 0 {
            info!("{} malformed pileup lines were skipped", self.malformed);
        }
        if self.normal_resets > 0 {
            info!("normal pileup was read from the start {} times", self.normal_resets);
        }
    }
}

// Counters for a multi-sample consensus run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsensusSummary
{
    pub positions: usize,
    pub covered_positions: usize,
    pub variant_positions: usize,
    pub snp_positions: usize,
    pub indel_positions: usize,
    pub strand_filtered: usize,
    pub reported: usize,
    pub malformed: usize
}

impl ConsensusSummary {
    pub fn new() -> ConsensusSummary {
        return ConsensusSummary::default();
    }

    pub fn log(&self) -> () {
        info!("{} bases in pileup file", self.positions);
        info!("{} bases had sufficient coverage in at least one sample", self.covered_positions);
        info!("{} variant positions ({} SNP, {} indel)", self.variant_positions, self.snp_positions, self.indel_positions);
        info!("{} were failed by the strand filter", self.strand_filtered);
        info!("{} positions reported", self.reported);
        if self.malformed > 0 {
            info!("{} malformed pileup lines were skipped", self.malformed);
        }
    }
}

// Counters for a father, mother and child run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrioSummary
{
    pub positions: usize,
    pub covered_positions: usize,
    pub variant_positions: usize,
    pub snp_positions: usize,
    pub indel_positions: usize,
    pub strand_filtered: usize,
    pub mendel_filtered: usize,
    pub reported: usize,
    pub snps_reported: usize,
    pub indels_reported: usize,
    pub de_novo_reported: usize,
    pub de_novo_snps_reported: usize,
    pub de_novo_indels_reported: usize,
    // (initial status, status after relaxed calling, sites)
    pub recalled: Vec<(TrioStatus, TrioStatus, usize)>,
    pub malformed: usize
}

impl TrioSummary {
    pub fn new() -> TrioSummary {
        return TrioSummary::default();
    }

    pub fn record_recall(& mut self, initial: TrioStatus, status: TrioStatus) -> () {
        match self.recalled.iter_mut().find(|(i, s, _)| *i == initial && *s == status) {
            Some(entry) => entry.2 += 1,
            None => self.recalled.push((initial, status, 1))
        }
    }

    // strand filtered sites are not counted as mendel errors
    pub fn record_site(& mut self, status: TrioStatus, indel: bool, strand_failed: bool) -> () {
        self.variant_positions += 1;
        if indel {
            self.indel_positions += 1;
        } else {
            self.snp_positions += 1;
        }

        if strand_failed {
            self.strand_filtered += 1;
            return;
        } else if status == TrioStatus::Mie {
            self.mendel_filtered += 1;
            return;
        }

        let de_novo = status == TrioStatus::DeNovo;
        self.reported += 1;
        if indel {
            self.indels_reported += 1;
        } else {
            self.snps_reported += 1;
        }
        if de_novo {
            self.de_novo_reported += 1;
            if indel {
                self.de_novo_indels_reported += 1;
            } else {
                self.de_novo_snps_reported += 1;
            }
        }
    }

    pub fn log(&self) -> () {
        info!("{} bases in pileup file", self.positions);
        info!("{} met the coverage requirement in all three samples", self.covered_positions);
        info!("{} variant positions ({} SNP, {} indel)", self.variant_positions, self.snp_positions, self.indel_positions);
        info!("{} were failed by the strand filter", self.strand_filtered);
        info!("{} were failed as Mendelian inheritance errors", self.mendel_filtered);
        info!("{} variant positions reported ({} SNP, {} indel)", self.reported, self.snps_reported, self.indels_reported);
        info!("{} de novo mutations reported ({} SNP, {} indel)", self.de_novo_reported,
              self.de_novo_snps_reported, self.de_novo_indels_reported);
        for (initial, status, count) in self.recalled.iter() {
            info!("{} initially {} were re-called {}", count, trio_status_to_str(*initial), trio_status_to_str(*status));
        }
        if self.malformed > 0 {
            info!("{} malformed pileup lines were skipped", self.malformed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_call() {
        let mut s = RunSummary::new();
        s.record_call(SomaticStatus::Somatic, false);
        s.record_call(SomaticStatus::Somatic, true);
        s.record_call(SomaticStatus::Reference, true);
        s.record_call(SomaticStatus::Loh, false);
        assert_eq!(s.somatic, 1);
        assert_eq!(s.strand_filter, 1);
        assert_eq!(s.reference, 1);
        assert_eq!(s.loh, 1);
        assert_eq!(s.germline, 0);
    }

    #[test]
    fn test_trio_counts() {
        let mut s = TrioSummary::new();
        s.record_site(TrioStatus::DeNovo, false, false);
        s.record_site(TrioStatus::Mie, false, false);
        s.record_site(TrioStatus::Mie, true, true);
        s.record_site(TrioStatus::Transmitted, true, false);
        assert_eq!(s.variant_positions, 4);
        assert_eq!(s.indel_positions, 2);
        assert_eq!(s.strand_filtered, 1);
        assert_eq!(s.mendel_filtered, 1);
        assert_eq!(s.reported, 2);
        assert_eq!(s.de_novo_snps_reported, 1);
        assert_eq!(s.indels_reported, 1);

        s.record_recall(TrioStatus::DeNovo, TrioStatus::Transmitted);
        s.record_recall(TrioStatus::DeNovo, TrioStatus::Transmitted);
        s.record_recall(TrioStatus::Mie, TrioStatus::MultipleAlleles);
        assert_eq!(s.recalled, vec![(TrioStatus::DeNovo, TrioStatus::Transmitted, 2),
                                    (TrioStatus::Mie, TrioStatus::MultipleAlleles, 1)]);
    }
}
