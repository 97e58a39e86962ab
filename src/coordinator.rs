//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use std::cmp::Ordering;
use std::collections::VecDeque;
use log::{debug, info};
use crate::errors::{Result, VarcallError};
use crate::parameters::SyncParameters;
use crate::pileup::MalformedBudget;
use crate::utility::LineSource;

// A pileup line with its position and 1-based line number
#[derive(Clone, Debug, PartialEq)]
pub struct NumberedLine
{
    pub number: u64,
    pub chrom: String,
    pub position: u64,
    pub text: String
}

impl NumberedLine {
    fn parse(text: String, number: u64) -> Result<NumberedLine> {
        let mut fields = text.split('\t');
        let chrom = fields.next().unwrap_or("");
        if chrom.is_empty() {
            return Err(VarcallError::malformed(number, "missing chromosome"));
        }
        let position: u64 = fields.next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| VarcallError::malformed(number, "missing or invalid position"))?;
        let chrom = chrom.to_owned();
        return Ok(NumberedLine { number: number, chrom: chrom, position: position, text: text });
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    // both streams report this position
    Matched { normal: NumberedLine, tumor: NumberedLine },
    // the normal stream has no line for this tumor position
    TumorOnly(NumberedLine),
    // the normal stream was read again from its first line
    NormalReset { chrom: String, resets: usize }
}

// Whether the normal stream can supply the current tumor chromosome
#[derive(Clone, Copy, Debug, PartialEq)]
enum ChromosomeStatus {
    Found,
    Absent,
    // the normal stream moved past the chromosome
    Passed
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum SyncState {
    AdvanceTumor,
    // scan forward through the normal stream for the tumor chromosome,
    // search_start is the normal line the scan started from (None at end of stream)
    CatchUpNormal { search_start: Option<u64>, rewind_on_miss: bool },
    SameChromSeek,
    ResetNormal { search_start: Option<u64> },
    Finished
}

//
// Walks a tumor pileup and pairs each of its positions with the normal
// pileup line at the same chromosome and position. The tumor stream is
// read exactly once. The normal stream is read forward and, when it cannot
// supply a chromosome ahead of its current line, rewound once for that
// chromosome.
//
pub struct StreamCoordinator<N: LineSource, T: LineSource>
{
    normal: N,
    tumor: T,
    params: SyncParameters,
    state: SyncState,

    normal_cursor: Option<NumberedLine>,
    normal_lines_read: u64,
    // malformed normal lines are only counted the first time they are read
    normal_lines_checked: u64,

    tumor_lines_read: u64,
    tumor_line: Option<NumberedLine>,
    tumor_chrom: Option<String>,
    chrom_status: ChromosomeStatus,

    resets: usize,
    pending: VecDeque<SyncEvent>,
    budget: MalformedBudget
}

impl<N: LineSource, T: LineSource> StreamCoordinator<N, T> {
    pub fn new(normal: N, tumor: T, params: SyncParameters) -> Result<StreamCoordinator<N, T>> {
        let budget = MalformedBudget::new(params.max_malformed_records);
        let mut coordinator = StreamCoordinator {
            normal: normal,
            tumor: tumor,
            params: params,
            state: SyncState::AdvanceTumor,
            normal_cursor: None,
            normal_lines_read: 0,
            normal_lines_checked: 0,
            tumor_lines_read: 0,
            tumor_line: None,
            tumor_chrom: None,
            chrom_status: ChromosomeStatus::Absent,
            resets: 0,
            pending: VecDeque::new(),
            budget: budget
        };
        coordinator.advance_normal()?;
        return Ok(coordinator);
    }

    pub fn resets(&self) -> usize {
        return self.resets;
    }

    // shared with the caller so malformed records found while parsing
    // the paired lines count towards the same limit
    pub fn budget_mut(& mut self) -> & mut MalformedBudget {
        return & mut self.budget;
    }

    pub fn next_event(& mut self) -> Result<Option<SyncEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            match self.state {
                SyncState::Finished => return Ok(None),
                SyncState::AdvanceTumor => self.advance_tumor()?,
                SyncState::CatchUpNormal { search_start, rewind_on_miss } => self.catch_up_normal(search_start, rewind_on_miss)?,
                SyncState::ResetNormal { search_start } => self.reset_normal(search_start)?,
                SyncState::SameChromSeek => self.same_chrom_seek()?
            }
        }
    }

    fn advance_normal(& mut self) -> Result<()> {
        loop {
            let text = match self.normal.next_line().transpose() {
                Some(t) => t,
                None => {
                    self.normal_cursor = None;
                    return Ok(());
                }
            };
            self.normal_lines_read += 1;
            let number = self.normal_lines_read;
            let first_read = number > self.normal_lines_checked;
            self.normal_lines_checked = self.normal_lines_checked.max(number);

            match text.and_then(|t| NumberedLine::parse(t, number)) {
                Ok(line) => {
                    self.normal_cursor = Some(line);
                    return Ok(());
                }
                // malformed lines seen before a rewind were already counted
                Err(e) => {
                    if first_read || !e.is_malformed() {
                        self.budget.record(e)?;
                    }
                }
            }
        }
    }

    fn read_tumor(& mut self) -> Result<Option<NumberedLine>> {
        loop {
            let text = match self.tumor.next_line().transpose() {
                Some(t) => t,
                None => return Ok(None)
            };
            self.tumor_lines_read += 1;
            let number = self.tumor_lines_read;
            match text.and_then(|t| NumberedLine::parse(t, number)) {
                Ok(line) => return Ok(Some(line)),
                Err(e) => self.budget.record(e)?
            }
        }
    }

    fn normal_on(&self, chrom: &str) -> bool {
        return self.normal_cursor.as_ref().map(|n| n.chrom == chrom).unwrap_or(false);
    }

    fn current_chrom(&self) -> String {
        return self.tumor_chrom.clone().unwrap_or_default();
    }

    fn advance_tumor(& mut self) -> Result<()> {
        let line = match self.read_tumor()? {
            Some(l) => l,
            None => {
                self.state = SyncState::Finished;
                return Ok(());
            }
        };

        let new_chrom = self.tumor_chrom.as_deref() != Some(line.chrom.as_str());
        if new_chrom {
            self.tumor_chrom = Some(line.chrom.clone());
            if self.normal_on(&line.chrom) {
                self.chrom_status = ChromosomeStatus::Found;
                self.state = SyncState::SameChromSeek;
            } else {
                // when the normal is behind in a known order, the chromosome can only be ahead of it
                let behind = match &self.normal_cursor {
                    Some(n) => self.params.chromosome_order.compare(&n.chrom, &line.chrom) == Some(Ordering::Less),
                    None => false
                };
                let search_start = self.normal_cursor.as_ref().map(|n| n.number);
                self.state = SyncState::CatchUpNormal { search_start: search_start, rewind_on_miss: !behind };
            }
        } else {
            self.state = SyncState::SameChromSeek;
        }

        self.tumor_line = Some(line);
        return Ok(());
    }

    fn catch_up_normal(& mut self, search_start: Option<u64>, rewind_on_miss: bool) -> Result<()> {
        let chrom = self.current_chrom();
        loop {
            match &self.normal_cursor {
                None => break,
                Some(n) if n.chrom == chrom => {
                    self.chrom_status = ChromosomeStatus::Found;
                    self.state = SyncState::SameChromSeek;
                    return Ok(());
                }
                Some(n) => {
                    if self.params.chromosome_order.compare(&n.chrom, &chrom) == Some(Ordering::Greater) {
                        break;
                    }
                }
            }
            self.advance_normal()?;
        }

        if rewind_on_miss {
            self.state = SyncState::ResetNormal { search_start: search_start };
        } else {
            info!("chromosome {} is not in the normal pileup", chrom);
            self.chrom_status = ChromosomeStatus::Absent;
            self.state = SyncState::SameChromSeek;
        }
        return Ok(());
    }

    fn unsynchronizable(&self, reason: String) -> VarcallError {
        let position = self.tumor_line.as_ref().map(|t| t.position).unwrap_or(0);
        return VarcallError::UnsynchronizableStreams { chrom: self.current_chrom(), position: position, reason: reason };
    }

    fn reset_normal(& mut self, search_start: Option<u64>) -> Result<()> {
        let chrom = self.current_chrom();
        self.resets += 1;
        if let Some(limit) = self.params.max_normal_resets {
            if self.resets > limit {
                return Err(self.unsynchronizable(format!("normal stream was reset more than {} times", limit)));
            }
        }

        info!("chromosome {} not found ahead in normal stream {}, reading it again from the start", chrom, self.normal.name());
        self.normal.rewind()?;
        self.normal_lines_read = 0;
        self.advance_normal()?;
        self.pending.push_back(SyncEvent::NormalReset { chrom: chrom.clone(), resets: self.resets });

        loop {
            match &self.normal_cursor {
                None => {
                    if search_start.is_some() {
                        return Err(self.unsynchronizable("normal stream ended before the line it was rewound from".to_owned()));
                    }
                    self.chrom_status = ChromosomeStatus::Absent;
                    break;
                }
                Some(n) if n.chrom == chrom => {
                    self.chrom_status = ChromosomeStatus::Found;
                    break;
                }
                Some(n) if Some(n.number) == search_start => {
                    self.chrom_status = ChromosomeStatus::Absent;
                    break;
                }
                _ => {}
            }
            self.advance_normal()?;
        }

        if self.chrom_status == ChromosomeStatus::Absent {
            info!("chromosome {} is not in the normal pileup", chrom);
        }
        self.state = SyncState::SameChromSeek;
        return Ok(());
    }

    fn same_chrom_seek(& mut self) -> Result<()> {
        self.state = SyncState::AdvanceTumor;
        let tumor = match self.tumor_line.take() {
            Some(t) => t,
            None => return Ok(())
        };

        if self.chrom_status != ChromosomeStatus::Found {
            self.pending.push_back(SyncEvent::TumorOnly(tumor));
            return Ok(());
        }

        loop {
            match &self.normal_cursor {
                Some(n) if n.chrom == tumor.chrom && n.position < tumor.position => {},
                _ => break
            }
            self.advance_normal()?;
        }

        let event = match &self.normal_cursor {
            Some(n) if n.chrom == tumor.chrom => {
                if n.position == tumor.position {
                    SyncEvent::Matched { normal: n.clone(), tumor: tumor }
                } else {
                    SyncEvent::TumorOnly(tumor)
                }
            }
            _ => {
                debug!("normal stream has moved past chromosome {}", tumor.chrom);
                self.chrom_status = ChromosomeStatus::Passed;
                SyncEvent::TumorOnly(tumor)
            }
        };
        self.pending.push_back(event);
        return Ok(());
    }
}
