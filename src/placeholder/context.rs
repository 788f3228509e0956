//! Party assignment for label placeholders (`Address:`, `Email:`, ...).
//!
//! A label has no name of its own; which signer it belongs to is decided by
//! the party markers (`COMPANY`, `[INVESTOR]`, ...) around it. The decision is
//! an ordered chain of strategies, each of which may abstain.

use log::debug;

use super::patterns::{find_party_markers, Party};
use crate::textutil::within_chars;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextWindows {
    /// Markers farther than this (in chars) are ignored by the local strategies.
    pub marker_range: usize,
    /// A marker following the label is accepted only this close.
    pub after_marker_range: usize,
    /// Document-level window before the last marker of a one-party document.
    pub last_marker_before: usize,
    /// Document-level window after the last marker of a one-party document.
    pub last_marker_after: usize,
}

impl Default for ContextWindows {
    fn default() -> Self {
        Self {
            marker_range: 3000,
            after_marker_range: 500,
            last_marker_before: 500,
            last_marker_after: 3000,
        }
    }
}

/// Party markers of one text, sorted by offset.
#[derive(Clone, Debug, Default)]
pub struct PartyMarkers {
    markers: Vec<(usize, Party)>,
}

impl PartyMarkers {
    pub fn scan(text: &str) -> Self {
        let mut markers = find_party_markers(text);
        markers.sort_by_key(|(off, _)| *off);
        Self { markers }
    }

    pub fn from_markers(mut markers: Vec<(usize, Party)>) -> Self {
        markers.sort_by_key(|(off, _)| *off);
        Self { markers }
    }

    fn last_of(&self, party: Party) -> Option<usize> {
        self.markers
            .iter()
            .rev()
            .find(|(_, p)| *p == party)
            .map(|(off, _)| *off)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartyStrategy {
    /// Nearest marker at or before the label, within range.
    NearestBefore,
    /// Nearest marker after the label, only when very close.
    NearestAfter,
    /// Position relative to the last company and last investor markers.
    DocumentLevel,
}

impl PartyStrategy {
    pub const CHAIN: [PartyStrategy; 3] = [
        PartyStrategy::NearestBefore,
        PartyStrategy::NearestAfter,
        PartyStrategy::DocumentLevel,
    ];

    pub fn resolve(
        self,
        text: &str,
        markers: &PartyMarkers,
        at: usize,
        windows: &ContextWindows,
    ) -> Option<Party> {
        match self {
            PartyStrategy::NearestBefore => markers
                .markers
                .iter()
                .rev()
                .filter(|(off, _)| *off <= at)
                .find(|(off, _)| within_chars(text, *off, at, windows.marker_range))
                .map(|(_, p)| *p),
            PartyStrategy::NearestAfter => {
                let preceded = markers.markers.iter().any(|(off, _)| {
                    *off <= at && within_chars(text, *off, at, windows.marker_range)
                });
                if preceded {
                    return None;
                }
                markers
                    .markers
                    .iter()
                    .filter(|(off, _)| *off > at)
                    .min_by_key(|(off, _)| *off - at)
                    .filter(|(off, _)| within_chars(text, at, *off, windows.after_marker_range))
                    .map(|(_, p)| *p)
            }
            PartyStrategy::DocumentLevel => document_level(text, markers, at, windows),
        }
    }
}

fn document_level(
    text: &str,
    markers: &PartyMarkers,
    at: usize,
    windows: &ContextWindows,
) -> Option<Party> {
    let last_company = markers.last_of(Party::Company);
    let last_investor = markers.last_of(Party::Investor);
    let near_last = |marker: usize| {
        if at < marker {
            within_chars(text, at, marker, windows.last_marker_before)
        } else {
            within_chars(text, marker, at, windows.last_marker_after)
        }
    };
    match (last_company, last_investor) {
        (_, Some(inv)) if at > inv => Some(Party::Investor),
        (Some(co), Some(inv)) if co < at && at < inv => Some(Party::Company),
        (Some(co), None) if near_last(co) => Some(Party::Company),
        (None, Some(inv)) if near_last(inv) => Some(Party::Investor),
        _ => None,
    }
}

/// Runs a strategy chain over one text snapshot.
#[derive(Clone, Debug)]
pub struct ContextResolver {
    markers: PartyMarkers,
    windows: ContextWindows,
    chain: Vec<PartyStrategy>,
}

impl ContextResolver {
    pub fn new(text: &str, windows: ContextWindows) -> Self {
        Self::with_chain(PartyMarkers::scan(text), windows, PartyStrategy::CHAIN.to_vec())
    }

    pub fn with_chain(markers: PartyMarkers, windows: ContextWindows, chain: Vec<PartyStrategy>) -> Self {
        Self {
            markers,
            windows,
            chain,
        }
    }

    /// First strategy in the chain that decides; `None` means the label is dropped.
    pub fn resolve(&self, text: &str, at: usize) -> Option<Party> {
        for strategy in &self.chain {
            if let Some(party) = strategy.resolve(text, &self.markers, at, &self.windows) {
                debug!("label at {at}: {party} via {strategy:?}");
                return Some(party);
            }
        }
        debug!("label at {at}: no party context");
        None
    }
}
