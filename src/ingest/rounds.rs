use chrono::{Datelike, NaiveDateTime};
use serde::Serialize;

/// One derived matchday window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSpan {
    /// "1.Matchday", "2.Matchday", ...
    pub name: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Positions of the member matches in the input sequence
    pub members: Vec<usize>,
}

pub fn round_name(index: usize) -> String {
    format!("{}.Matchday", index)
}

/// Same ISO week of the same ISO year.
pub fn same_week(a: NaiveDateTime, b: NaiveDateTime) -> bool {
    a.iso_week() == b.iso_week()
}

/// Incremental week-boundary grouping over a chronologically ordered stream
/// of kick-off times. A new round opens when a match falls outside the ISO
/// week of the running round's start; bounds widen as members arrive.
/// Undated matches join the running round and leave its bounds untouched.
#[derive(Debug, Default)]
pub struct RoundGrouper {
    rounds: Vec<RoundSpan>,
    seen: usize,
}

impl RoundGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the next match and return the round it joined.
    pub fn push(&mut self, date: Option<NaiveDateTime>) -> &RoundSpan {
        let position = self.seen;
        self.seen += 1;

        let opens_round = match (self.rounds.last(), date) {
            (None, _) => true,
            (Some(current), Some(d)) => current.start.is_some_and(|s| !same_week(d, s)),
            (Some(_), None) => false,
        };

        if opens_round {
            self.rounds.push(RoundSpan {
                name: round_name(self.rounds.len() + 1),
                start: date,
                end: date,
                members: vec![position],
            });
        } else if let Some(current) = self.rounds.last_mut() {
            current.members.push(position);
            if let Some(d) = date {
                current.start = Some(current.start.map_or(d, |s| s.min(d)));
                current.end = Some(current.end.map_or(d, |e| e.max(d)));
            }
        }
        // A round was pushed above or already existed.
        &self.rounds[self.rounds.len() - 1]
    }

    pub fn rounds(&self) -> &[RoundSpan] {
        &self.rounds
    }

    pub fn into_rounds(self) -> Vec<RoundSpan> {
        self.rounds
    }
}

/// Partition a whole ordered sequence at once.
pub fn group_rounds(dates: &[Option<NaiveDateTime>]) -> Vec<RoundSpan> {
    let mut grouper = RoundGrouper::new();
    for date in dates {
        grouper.push(*date);
    }
    grouper.into_rounds()
}
