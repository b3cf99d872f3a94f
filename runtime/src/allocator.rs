//! Round-robin allocation of shuffled participants to shuffled resources.
//!
//! Participant `i` of the shuffled list gets resource `i mod R`, so when
//! participants outnumber resources every resource is used
//! `floor(P / R)` or `ceil(P / R)` times. Draw orders are consecutive from a
//! base offset.

use std::collections::{BTreeMap, HashMap};
use sweepstake_core::types::{Participant, PlannedAssignment, Resource, ResourceId};
use sweepstake_core::{DrawError, Result};

/// Pair up participants and resources round-robin.
///
/// Returns `(participant, resource, position)` triples with positions
/// `0..participants.len()`.
///
/// # Errors
///
/// Returns [`DrawError::Capacity`] when either list is empty.
pub fn round_robin<'a, P, R>(
    participants: &'a [P],
    resources: &'a [R],
) -> Result<Vec<(&'a P, &'a R, usize)>> {
    if participants.is_empty() {
        return Err(DrawError::Capacity(
            "no active participants to draw".to_string(),
        ));
    }
    if resources.is_empty() {
        return Err(DrawError::Capacity(
            "no available resources to draw".to_string(),
        ));
    }

    Ok(participants
        .iter()
        .enumerate()
        .map(|(i, participant)| (participant, &resources[i % resources.len()], i))
        .collect())
}

/// Build the draw plan for shuffled inputs, numbering draw orders from
/// `first_draw_order`.
///
/// # Errors
///
/// Returns [`DrawError::Capacity`] when either list is empty, or
/// [`DrawError::Validation`] if draw orders would overflow.
pub fn plan_assignments(
    participants: &[Participant],
    resources: &[Resource],
    first_draw_order: u32,
) -> Result<Vec<PlannedAssignment>> {
    round_robin(participants, resources)?
        .into_iter()
        .map(|(participant, resource, position)| {
            let draw_order = u32::try_from(position)
                .ok()
                .and_then(|p| first_draw_order.checked_add(p))
                .ok_or_else(|| DrawError::Validation("draw order overflow".to_string()))?;
            Ok(PlannedAssignment {
                participant_id: participant.id,
                resource_id: resource.id,
                resource_number: resource.number,
                draw_order,
            })
        })
        .collect()
}

/// Order resources by current load, fewest assignments first.
///
/// The sort is stable, so resources with equal load keep their input order;
/// pass a shuffled list to break ties randomly.
#[must_use]
pub fn least_loaded_ranking(
    resources: &[Resource],
    loads: &HashMap<ResourceId, usize>,
) -> Vec<Resource> {
    let mut ranked = resources.to_vec();
    ranked.sort_by_key(|r| loads.get(&r.id).copied().unwrap_or(0));
    ranked
}

/// Number of planned assignments per resource number.
#[must_use]
pub fn distribution(plan: &[PlannedAssignment]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for entry in plan {
        *counts.entry(entry.resource_number).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use sweepstake_core::types::{EventId, ParticipantId};

    fn participants(event_id: EventId, count: usize) -> Vec<Participant> {
        (0..count)
            .map(|i| Participant {
                id: ParticipantId::new(),
                event_id,
                name: format!("P{i}"),
                registered_at: Utc::now(),
                active: true,
            })
            .collect()
    }

    fn resources(event_id: EventId, count: u32) -> Vec<Resource> {
        (1..=count)
            .map(|number| Resource {
                id: ResourceId::new(),
                event_id,
                number,
                label: format!("R{number}"),
                withdrawn: false,
                withdrawn_reason: None,
                withdrawn_at: None,
                version: 1,
                updated_by: None,
            })
            .collect()
    }

    #[test]
    fn five_participants_over_three_resources() {
        let event_id = EventId::new();
        let people = participants(event_id, 5);
        let runners = resources(event_id, 3);

        let plan = plan_assignments(&people, &runners, 1).unwrap();

        let numbers: Vec<u32> = plan.iter().map(|p| p.resource_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 1, 2]);
        let orders: Vec<u32> = plan.iter().map(|p| p.draw_order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5]);
        assert_eq!(
            distribution(&plan),
            BTreeMap::from([(1, 2), (2, 2), (3, 1)])
        );
    }

    #[test]
    fn empty_inputs_are_capacity_errors() {
        let event_id = EventId::new();
        assert!(matches!(
            plan_assignments(&[], &resources(event_id, 2), 1),
            Err(DrawError::Capacity(_))
        ));
        assert!(matches!(
            plan_assignments(&participants(event_id, 2), &[], 1),
            Err(DrawError::Capacity(_))
        ));
    }

    #[test]
    fn ranking_prefers_unloaded_resources_and_keeps_ties_in_order() {
        let event_id = EventId::new();
        let runners = resources(event_id, 4);
        let loads = HashMap::from([(runners[0].id, 2), (runners[1].id, 1), (runners[3].id, 1)]);

        let ranked: Vec<u32> = least_loaded_ranking(&runners, &loads)
            .iter()
            .map(|r| r.number)
            .collect();

        assert_eq!(ranked, vec![3, 2, 4, 1]);
    }

    proptest! {
        #[test]
        fn loads_differ_by_at_most_one(p in 1usize..200, r in 1usize..40) {
            let people: Vec<usize> = (0..p).collect();
            let slots: Vec<usize> = (0..r).collect();
            let pairs = round_robin(&people, &slots).unwrap();

            let mut loads = vec![0usize; r];
            for (_, slot, _) in &pairs {
                loads[**slot] += 1;
            }
            let max = loads.iter().max().copied().unwrap();
            let min = loads.iter().min().copied().unwrap();
            prop_assert!(max - min <= 1);
            prop_assert_eq!(max, p.div_ceil(r));
            prop_assert_eq!(pairs.len(), p);
        }

        #[test]
        fn every_participant_appears_once(p in 1usize..200, r in 1usize..40) {
            let people: Vec<usize> = (0..p).collect();
            let slots: Vec<usize> = (0..r).collect();
            let mut seen: Vec<usize> = round_robin(&people, &slots)
                .unwrap()
                .into_iter()
                .map(|(person, _, _)| *person)
                .collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, people);
        }
    }
}
