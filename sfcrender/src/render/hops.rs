use crate::inventory::InventorySnapshot;
use crate::model::{Forwarder, Hop, HopTarget, MAX_SERVICE_INDEX};
use crate::scheduler::HopPin;
use crate::Error;
use log::*;
use std::collections::HashSet;

/// Longest chain whose service indices stay within `0..=255`.
pub const MAX_HOPS: usize = MAX_SERVICE_INDEX as usize + 1;

/// Turn the scheduled targets into hops. Hop `n` gets service index `255 - n` and the forwarder
/// hosting its target, unless the pin names a forwarder.
pub(crate) fn build_hops(
    snapshot: &InventorySnapshot,
    targets: &[HopTarget],
    pins: &[Option<HopPin>],
) -> Result<Vec<Hop>, Error> {
    if targets.len() > MAX_HOPS {
        return Err(Error::ChainTooLong(targets.len()));
    }
    targets
        .iter()
        .enumerate()
        .map(|(n, target)| {
            let pinned = pins.get(n).and_then(|p| p.as_ref()).and_then(|p| p.forwarder.as_deref());
            let forwarder = match pinned {
                Some(name) => snapshot.forwarder(name).ok_or_else(|| Error::ForwarderNotFound(name.to_string()))?,
                None => hosting_forwarder(snapshot, target)?,
            };
            Ok(Hop {
                hop_number: n as u8,
                service_index: MAX_SERVICE_INDEX - n as u8,
                target: target.clone(),
                forwarder: forwarder.name.clone(),
                forwarder_locator: select_locator(forwarder)?,
            })
        })
        .collect()
}

fn hosting_forwarder<'a>(snapshot: &'a InventorySnapshot, target: &HopTarget) -> Result<&'a Forwarder, Error> {
    let function = match target {
        HopTarget::Function(name) => name.as_str(),
        HopTarget::Group(group) => snapshot
            .group_anchor(group)
            .map(|a| a.name.as_str())
            .ok_or_else(|| Error::UnattachedFunction(target.to_string()))?,
    };
    snapshot.hosting_forwarder(function).ok_or_else(|| Error::UnattachedFunction(function.to_string()))
}

/// The locator the forwarder uses towards other forwarders. Locators referenced by an attached
/// function are function-facing. A single remaining locator is used as is; with several, the one
/// tagged as non-function wins. A forwarder without locators gets none.
pub(crate) fn select_locator(forwarder: &Forwarder) -> Result<Option<String>, Error> {
    if forwarder.locators.is_empty() {
        return Ok(None);
    }
    let function_facing: HashSet<&str> =
        forwarder.functions.values().filter_map(|f| f.locator.as_deref()).collect();
    let candidates: Vec<_> = forwarder.locators.iter().filter(|l| !function_facing.contains(l.name.as_str())).collect();
    if candidates.len() == 1 {
        return Ok(Some(candidates[0].name.clone()));
    }
    let tagged: Vec<_> = candidates.iter().filter(|l| l.non_function).collect();
    if tagged.len() == 1 {
        return Ok(Some(tagged[0].name.clone()));
    }
    debug!(
        "Forwarder {} has {} candidate locators, {} tagged non-function",
        forwarder.name,
        candidates.len(),
        tagged.len()
    );
    Err(Error::AmbiguousForwarderLocator(forwarder.name.clone()))
}
