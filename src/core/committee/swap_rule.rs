// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Swap rules: which validators rotate in and out of a committee.
//!
//! Ordering contract:
//! - substitutes are promoted FIFO; penalized substitutes are skipped but stay queued
//! - outgoing members are taken by penalty weight (descending), then, for the
//!   sync-pool rule, term-expired members, then by committee position
//! - the first `fixed_validators` members never leave
//! - incoming keys take vacated seats in position order; extras are appended

use crate::core::config::{ChainParams, StateVersion};
use crate::core::instruction::{SwapInstruction, SwapTarget};
use crate::core::types::CommitteePublicKey;
use std::collections::{BTreeMap, BTreeSet};

/// Penalty weight per key string; absent or zero means not penalized.
pub type PenaltyMap = BTreeMap<String, u32>;

/// Inputs of one swap decision.
#[derive(Clone, Debug)]
pub struct SwapInput<'a> {
    /// Committee being rotated.
    pub target: SwapTarget,
    /// Current committee.
    pub committee: &'a [CommitteePublicKey],
    /// Current substitutes, oldest first.
    pub substitute: &'a [CommitteePublicKey],
    /// Committee lower bound.
    pub min_committee_size: usize,
    /// Committee upper bound.
    pub max_committee_size: usize,
    /// Leading members that never leave.
    pub fixed_validators: usize,
    /// Maximum members swapped out.
    pub swap_offset: usize,
    /// Substitute cap (0 = unlimited).
    pub max_substitute_size: usize,
    /// Penalty weights.
    pub penalties: &'a PenaltyMap,
    /// Members whose term has expired.
    pub term_expired: &'a BTreeSet<String>,
}

/// Result of a swap decision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapOutcome {
    /// Instruction to emit, `None` if no swap is due.
    pub instruction: Option<SwapInstruction>,
    /// Committee after the swap.
    pub new_committee: Vec<CommitteePublicKey>,
    /// Substitutes after the swap (promoted and dropped removed).
    pub new_substitute: Vec<CommitteePublicKey>,
    /// Promoted substitutes.
    pub swapped_in: Vec<CommitteePublicKey>,
    /// Members leaving the committee.
    pub swapped_out: Vec<CommitteePublicKey>,
    /// Subset of `swapped_out` that is punished.
    pub slashed: Vec<CommitteePublicKey>,
    /// Newest substitutes beyond the substitute cap.
    pub dropped: Vec<CommitteePublicKey>,
}

/// Swap policy of one committee-state version.
pub trait SwapRule: Send + Sync {
    /// Decide a swap.
    fn gen_instruction(&self, input: &SwapInput<'_>) -> SwapOutcome;

    /// Candidates one shard may receive per random epoch.
    fn assign_offset(
        &self,
        len_substitute: usize,
        len_committee: usize,
        fixed_validators: usize,
        min_committee_size: usize,
    ) -> usize;

    /// State version this rule belongs to.
    fn version(&self) -> StateVersion;
}

fn weight(penalties: &PenaltyMap, key: &CommitteePublicKey) -> u32 {
    penalties.get(&key.to_key_string()).copied().unwrap_or(0)
}

fn run_swap(input: &SwapInput<'_>, use_terms: bool) -> SwapOutcome {
    let committee = input.committee;
    let fixed = input.fixed_validators.min(committee.len());

    struct Cand {
        pos: usize,
        weight: u32,
        expired: bool,
    }
    let mut cands: Vec<Cand> = committee
        .iter()
        .enumerate()
        .skip(fixed)
        .map(|(pos, k)| Cand {
            pos,
            weight: weight(input.penalties, k),
            expired: use_terms && input.term_expired.contains(&k.to_key_string()),
        })
        .collect();
    cands.sort_by(|a, b| {
        b.weight
            .cmp(&a.weight)
            .then_with(|| b.expired.cmp(&a.expired))
            .then_with(|| a.pos.cmp(&b.pos))
    });
    let forced = cands.iter().filter(|c| c.weight > 0 || c.expired).count();

    let eligible: Vec<&CommitteePublicKey> = input
        .substitute
        .iter()
        .filter(|k| weight(input.penalties, k) == 0)
        .collect();

    let vacancy = input.max_committee_size.saturating_sub(committee.len());
    let mut n_in = eligible.len().min(vacancy + input.swap_offset);
    let n_out = n_in
        .saturating_sub(vacancy)
        .max(forced)
        .min(input.swap_offset)
        .min(cands.len())
        .min((committee.len() + n_in).saturating_sub(input.min_committee_size));
    n_in = n_in.min(input.max_committee_size.saturating_sub(committee.len() - n_out));

    if n_in == 0 && n_out == 0 {
        return SwapOutcome {
            instruction: None,
            new_committee: committee.to_vec(),
            new_substitute: input.substitute.to_vec(),
            ..SwapOutcome::default()
        };
    }

    let swapped_in: Vec<CommitteePublicKey> = eligible[..n_in].iter().map(|k| (*k).clone()).collect();
    let chosen = &cands[..n_out];
    let swapped_out: Vec<CommitteePublicKey> =
        chosen.iter().map(|c| committee[c.pos].clone()).collect();
    let slashed: Vec<CommitteePublicKey> = chosen
        .iter()
        .filter(|c| c.weight > 0)
        .map(|c| committee[c.pos].clone())
        .collect();

    let mut vacated: Vec<usize> = chosen.iter().map(|c| c.pos).collect();
    vacated.sort_unstable();
    let mut seats: Vec<Option<CommitteePublicKey>> = committee.iter().cloned().map(Some).collect();
    let mut incoming = swapped_in.iter();
    for pos in vacated.iter() {
        seats[*pos] = incoming.next().cloned();
    }
    let mut new_committee: Vec<CommitteePublicKey> = seats.into_iter().flatten().collect();
    new_committee.extend(incoming.cloned());

    let mut new_substitute: Vec<CommitteePublicKey> = input
        .substitute
        .iter()
        .filter(|k| !swapped_in.contains(k))
        .cloned()
        .collect();
    let dropped = if input.max_substitute_size > 0 && new_substitute.len() > input.max_substitute_size {
        new_substitute.split_off(input.max_substitute_size)
    } else {
        Vec::new()
    };

    SwapOutcome {
        instruction: Some(SwapInstruction {
            in_public_keys: swapped_in.clone(),
            out_public_keys: swapped_out.clone(),
            punished_public_keys: slashed.clone(),
            target: Some(input.target),
        }),
        new_committee,
        new_substitute,
        swapped_in,
        swapped_out,
        slashed,
        dropped,
    }
}

/// Penalty weights that make a rule reproduce a received swap.
///
/// Punished keys get strictly decreasing weights in listed order; substitutes
/// that were not promoted are treated as penalized.
pub fn penalties_for_replay(inst: &SwapInstruction, substitute: &[CommitteePublicKey]) -> PenaltyMap {
    let mut out = PenaltyMap::new();
    let n = inst.punished_public_keys.len() as u32;
    for (i, k) in inst.punished_public_keys.iter().enumerate() {
        out.insert(k.to_key_string(), n - i as u32);
    }
    for k in substitute.iter().filter(|k| !inst.in_public_keys.contains(k)) {
        out.insert(k.to_key_string(), 1);
    }
    out
}

/// Swap rule of the slashing base state.
#[derive(Clone, Debug)]
pub struct SwapRuleV2 {
    assign_offset: usize,
}

impl SwapRuleV2 {
    /// Rule with a fixed per-shard assign offset.
    pub fn new(assign_offset: usize) -> Self {
        Self { assign_offset }
    }
}

impl SwapRule for SwapRuleV2 {
    fn gen_instruction(&self, input: &SwapInput<'_>) -> SwapOutcome {
        run_swap(input, false)
    }

    fn assign_offset(&self, _: usize, _: usize, _: usize, _: usize) -> usize {
        self.assign_offset
    }

    fn version(&self) -> StateVersion {
        StateVersion::Slashing
    }
}

/// Swap rule of the sync-pool state: term-expired members leave early and the
/// assign offset scales with committee size.
#[derive(Clone, Debug, Default)]
pub struct SwapRuleV3;

const MAX_ASSIGN_PERCENT: usize = 8;

impl SwapRule for SwapRuleV3 {
    fn gen_instruction(&self, input: &SwapInput<'_>) -> SwapOutcome {
        run_swap(input, true)
    }

    fn assign_offset(
        &self,
        len_substitute: usize,
        len_committee: usize,
        fixed_validators: usize,
        min_committee_size: usize,
    ) -> usize {
        let n = len_committee / MAX_ASSIGN_PERCENT;
        if n == 0 && len_substitute < fixed_validators.max(min_committee_size) {
            1
        } else {
            n
        }
    }

    fn version(&self) -> StateVersion {
        StateVersion::SyncPool
    }
}

/// Rule of a state version.
pub fn swap_rule(version: StateVersion, assign_offset: usize) -> Box<dyn SwapRule> {
    match version {
        StateVersion::Slashing => Box::new(SwapRuleV2::new(assign_offset)),
        StateVersion::SyncPool => Box::new(SwapRuleV3),
    }
}

/// Rule for the configured state version.
pub fn swap_rule_for(params: &ChainParams) -> Box<dyn SwapRule> {
    swap_rule(params.state_version, params.assign_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instruction::test_keys::{key, ks};

    struct Case {
        committee: Vec<CommitteePublicKey>,
        substitute: Vec<CommitteePublicKey>,
        penalties: PenaltyMap,
        expired: BTreeSet<String>,
        min: usize,
        max: usize,
        fixed: usize,
        offset: usize,
        max_sub: usize,
    }

    impl Case {
        fn new(committee: &[u8], substitute: &[u8]) -> Self {
            Self {
                committee: committee.iter().map(|n| key(*n)).collect(),
                substitute: substitute.iter().map(|n| key(*n)).collect(),
                penalties: PenaltyMap::new(),
                expired: BTreeSet::new(),
                min: 4,
                max: 4,
                fixed: 0,
                offset: 1,
                max_sub: 0,
            }
        }

        fn run(&self, rule: &dyn SwapRule) -> SwapOutcome {
            rule.gen_instruction(&SwapInput {
                target: SwapTarget::Shard(0),
                committee: &self.committee,
                substitute: &self.substitute,
                min_committee_size: self.min,
                max_committee_size: self.max,
                fixed_validators: self.fixed,
                swap_offset: self.offset,
                max_substitute_size: self.max_sub,
                penalties: &self.penalties,
                term_expired: &self.expired,
            })
        }
    }

    #[test]
    fn earliest_member_rotates_out_and_seat_is_reused() {
        let c = Case::new(&[1, 2, 3, 4], &[5, 6]);
        let out = c.run(&SwapRuleV2::new(2));
        assert_eq!(out.swapped_in, vec![key(5)]);
        assert_eq!(out.swapped_out, vec![key(1)]);
        assert_eq!(out.new_committee, vec![key(5), key(2), key(3), key(4)]);
        assert_eq!(out.new_substitute, vec![key(6)]);
        assert!(out.slashed.is_empty());
    }

    #[test]
    fn penalty_order_beats_position_and_fixed_never_leave() {
        let mut c = Case::new(&[1, 2, 3, 4], &[5, 6]);
        c.offset = 2;
        c.fixed = 1;
        c.penalties.insert(ks(1), 9);
        c.penalties.insert(ks(3), 2);
        c.penalties.insert(ks(4), 5);
        let out = c.run(&SwapRuleV2::new(2));
        assert_eq!(out.swapped_out, vec![key(4), key(3)]);
        assert_eq!(out.slashed, vec![key(4), key(3)]);
        assert_eq!(out.new_committee, vec![key(1), key(2), key(5), key(6)]);
    }

    #[test]
    fn penalized_substitute_is_skipped_but_kept() {
        let mut c = Case::new(&[1, 2, 3, 4], &[5, 6, 7]);
        c.penalties.insert(ks(5), 1);
        let out = c.run(&SwapRuleV2::new(2));
        assert_eq!(out.swapped_in, vec![key(6)]);
        assert_eq!(out.new_substitute, vec![key(5), key(7)]);
    }

    #[test]
    fn no_swap_when_nothing_moves() {
        let c = Case::new(&[1, 2, 3, 4], &[]);
        let out = c.run(&SwapRuleV2::new(2));
        assert!(out.instruction.is_none());
        assert_eq!(out.new_committee, c.committee);
    }

    #[test]
    fn vacancy_fills_without_swapping_out() {
        let mut c = Case::new(&[1, 2, 3], &[5, 6, 7]);
        c.min = 2;
        c.max = 5;
        let out = c.run(&SwapRuleV2::new(2));
        // two vacancies plus one rotation
        assert_eq!(out.swapped_in, vec![key(5), key(6), key(7)]);
        assert_eq!(out.swapped_out, vec![key(1)]);
        assert_eq!(out.new_committee, vec![key(5), key(2), key(3), key(6), key(7)]);
    }

    #[test]
    fn committee_never_shrinks_below_min() {
        let mut c = Case::new(&[1, 2, 3, 4], &[]);
        c.penalties.insert(ks(2), 3);
        let out = c.run(&SwapRuleV2::new(2));
        assert!(out.instruction.is_none());
    }

    #[test]
    fn overflow_drops_newest_substitutes() {
        let mut c = Case::new(&[1, 2, 3, 4], &[5, 6, 7, 8]);
        c.max_sub = 2;
        let out = c.run(&SwapRuleV2::new(2));
        assert_eq!(out.new_substitute, vec![key(6), key(7)]);
        assert_eq!(out.dropped, vec![key(8)]);
    }

    #[test]
    fn term_expiry_only_counts_for_v3() {
        let mut c = Case::new(&[1, 2, 3, 4], &[5]);
        c.expired.insert(ks(3));
        assert_eq!(c.run(&SwapRuleV3).swapped_out, vec![key(3)]);
        assert_eq!(c.run(&SwapRuleV2::new(1)).swapped_out, vec![key(1)]);
    }

    #[test]
    fn replay_penalties_reproduce_instruction() {
        let mut c = Case::new(&[1, 2, 3, 4], &[5, 6, 7]);
        c.offset = 2;
        c.penalties.insert(ks(2), 4);
        c.penalties.insert(ks(4), 4);
        c.penalties.insert(ks(5), 1);
        let first = c.run(&SwapRuleV3);
        let inst = first.instruction.clone().unwrap();

        let mut replay = Case::new(&[1, 2, 3, 4], &[5, 6, 7]);
        replay.offset = 2;
        replay.penalties = penalties_for_replay(&inst, &replay.substitute);
        let second = replay.run(&SwapRuleV3);
        assert_eq!(second.instruction, Some(inst));
        assert_eq!(second.new_committee, first.new_committee);
    }

    #[test]
    fn v3_assign_offset_scales_with_committee() {
        let r = SwapRuleV3;
        assert_eq!(r.assign_offset(0, 4, 0, 4), 1);
        assert_eq!(r.assign_offset(10, 4, 0, 4), 0);
        assert_eq!(r.assign_offset(0, 32, 0, 4), 4);
        assert_eq!(SwapRuleV2::new(3).assign_offset(0, 32, 0, 4), 3);
    }
}
