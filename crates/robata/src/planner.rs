//! # Batch planning
//!
//! The [`BatchPlanner`] turns an ordered group of independent calls into a
//! single merged call plus a [`BatchPlan`] that records where each caller's
//! items sit along the batch axis, and uses that plan to split the merged
//! output back into one result per caller.
//!
//! Callers are merged and split in strict arrival order. Deciding *when* a
//! group is complete is not the planner's concern.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::{Result, RobataError};
use crate::params::{ArgKey, ParameterSet};
use crate::payload::{self, Payload};
use crate::runnable::MethodSignature;

/// Identifies one caller within a batch group.
pub type CallerId = Uuid;

/// Batch axis per argument; `None` marks an argument that is passed through.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAxes {
    default: Option<usize>,
    overrides: BTreeMap<ArgKey, Option<usize>>,
}

impl BatchAxes {
    /// Every argument is batched along `axis`.
    pub fn uniform(axis: usize) -> Self {
        Self { default: Some(axis), overrides: BTreeMap::new() }
    }

    /// Batch `key` along `axis` instead of the default.
    pub fn with_axis(mut self, key: impl Into<ArgKey>, axis: usize) -> Self {
        self.overrides.insert(key.into(), Some(axis));
        self
    }

    /// Pass `key` through unmerged; it must be identical across the group.
    pub fn unbatched(mut self, key: impl Into<ArgKey>) -> Self {
        self.overrides.insert(key.into(), None);
        self
    }

    pub fn axis_for(&self, key: &ArgKey) -> Option<usize> {
        self.overrides.get(key).copied().unwrap_or(self.default)
    }

    /// Input axes as declared by a method signature.
    pub fn for_method(signature: &MethodSignature) -> Self {
        signature
            .unbatched_args
            .iter()
            .cloned()
            .fold(Self::uniform(signature.batch_dim.input), Self::unbatched)
    }
}

/// One caller's slice of the merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub caller: CallerId,
    pub start: usize,
    pub end: usize,
}

impl Slot {
    pub fn extent(&self) -> usize {
        self.end - self.start
    }
}

/// # BatchPlan
///
/// Reconstruction plan for a merged call: one [`Slot`] per caller, in merge
/// order. The slots tile `0..total` without gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    slots: Vec<Slot>,
    output_axis: usize,
}

impl BatchPlan {
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn output_axis(&self) -> usize {
        self.output_axis
    }

    pub fn extents(&self) -> Vec<usize> {
        self.slots.iter().map(Slot::extent).collect()
    }

    /// Merged extent along the batch axis
    pub fn total(&self) -> usize {
        self.slots.last().map(|slot| slot.end).unwrap_or(0)
    }

    pub fn callers(&self) -> impl Iterator<Item = CallerId> + '_ {
        self.slots.iter().map(|slot| slot.caller)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Merges groups of calls for one method and splits their merged output.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlanner {
    axes: BatchAxes,
    output_axis: usize,
}

impl BatchPlanner {
    pub fn new(axes: BatchAxes, output_axis: usize) -> Self {
        Self { axes, output_axis }
    }

    pub fn for_method(signature: &MethodSignature) -> Self {
        Self::new(BatchAxes::for_method(signature), signature.batch_dim.output)
    }

    pub fn axes(&self) -> &BatchAxes {
        &self.axes
    }

    /// Checks what can be checked on one call alone, before it joins a group.
    ///
    /// Every batched array or table must have the batch axis, and all of them
    /// must agree on the call's extent, which is returned. Kind conflicts with
    /// other callers only show up in [`BatchPlanner::plan`].
    pub fn check_call(&self, params: &ParameterSet<Payload>) -> Result<Option<usize>> {
        let mut extent: Option<(ArgKey, usize)> = None;
        for (key, payload) in params.iter() {
            let Some(axis) = self.axes.axis_for(&key) else { continue };
            if !payload.kind.is_batchable() {
                continue;
            }
            let items = payload
                .extent_along(axis)
                .ok_or_else(|| RobataError::incompatible(format!(
                    "argument `{key}` ({}) has no axis {axis}",
                    payload.kind
                )))?;
            if let Some((first_key, first)) = &extent {
                if *first != items {
                    return Err(RobataError::malformed(format!(
                        "argument `{key}` holds {items} items but `{first_key}` holds {first}"
                    )));
                }
            } else {
                extent = Some((key, items));
            }
        }
        Ok(extent.map(|(_, items)| items))
    }

    /// Merges an ordered group of calls into one call.
    ///
    /// Every call must have the same argument keys. Batched arguments are merged
    /// along their axis; pass-through arguments must be identical across the
    /// group and appear once in the merged call. All batched arguments of one
    /// caller must agree on that caller's extent.
    pub fn plan(&self, calls: Vec<(CallerId, ParameterSet<Payload>)>) -> Result<(ParameterSet<Payload>, BatchPlan)> {
        let (_, template) = calls
            .first()
            .ok_or_else(|| RobataError::malformed("cannot plan an empty batch group"))?;
        if let Some((caller, _)) = calls.iter().find(|(_, params)| !params.same_signature(template)) {
            return Err(RobataError::incompatible(format!(
                "caller {caller} does not share the call signature of the group"
            )));
        }

        let mut extents: Option<(ArgKey, Vec<usize>)> = None;
        let mut merged_args = Vec::with_capacity(template.args().len());
        let mut merged_kwargs = Vec::with_capacity(template.kwargs().len());

        for key in template.keys() {
            let column: Vec<&Payload> = calls
                .iter()
                .map(|(_, params)| params.get(&key))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| RobataError::incompatible(format!("argument `{key}` is missing")))?;

            let merged = match self.axes.axis_for(&key) {
                None => pass_through(&key, &column)?,
                Some(axis) => {
                    let owned: Vec<Payload> = column.iter().map(|&p| p.clone()).collect();
                    let merged = payload::merge(&owned, axis)?;
                    let item_extents = owned
                        .iter()
                        .map(|p| p.extent_along(axis))
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(|| RobataError::incompatible(format!(
                            "argument `{key}` has no axis {axis}"
                        )))?;
                    if let Some((first_key, first)) = &extents {
                        if *first != item_extents {
                            return Err(RobataError::malformed(format!(
                                "argument `{key}` holds {item_extents:?} items per caller but `{first_key}` holds {first:?}"
                            )));
                        }
                    }
                    if extents.is_none() {
                        extents = Some((key.clone(), item_extents));
                    }
                    merged
                }
            };

            match key {
                ArgKey::Positional(_) => merged_args.push(merged),
                ArgKey::Named(name) => merged_kwargs.push((name, merged)),
            }
        }

        let (_, extents) = extents
            .ok_or_else(|| RobataError::incompatible("a batch group needs at least one batched argument"))?;

        let mut start = 0;
        let slots = calls
            .iter()
            .zip(extents)
            .map(|((caller, _), extent)| {
                let slot = Slot { caller: *caller, start, end: start + extent };
                start = slot.end;
                slot
            })
            .collect();

        let merged = ParameterSet::from_parts(merged_args, merged_kwargs)?;
        Ok((merged, BatchPlan { slots, output_axis: self.output_axis }))
    }

    /// Splits a merged output into one payload per caller, in plan order.
    pub fn split(&self, plan: &BatchPlan, output: &Payload) -> Result<Vec<(CallerId, Payload)>> {
        let pieces = payload::split(output, plan.output_axis, &plan.extents())?;
        Ok(plan.callers().zip(pieces).collect())
    }
}

fn pass_through(key: &ArgKey, column: &[&Payload]) -> Result<Payload> {
    let first = column[0];
    if column.iter().any(|&p| p != first) {
        return Err(RobataError::NonBatchableMismatch(key.to_string()));
    }
    Ok(first.clone())
}
