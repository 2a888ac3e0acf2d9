//! Symmetric paths.
//!
//! The reverse of a rendered path visits the same hops in the opposite order. Its name toggles
//! the [`REVERSE_SUFFIX`] and its path id is the symmetric id of the forward path.

use crate::inventory::InventorySnapshot;
use crate::model::{Chain, Hop, PathId, PathSpec, RenderedServicePath, MAX_SERVICE_INDEX};

pub const REVERSE_SUFFIX: &str = "-Reverse";

/// Append the reverse suffix, or strip it if the name already carries it.
pub fn toggle_reverse_name(name: &str) -> String {
    match name.strip_suffix(REVERSE_SUFFIX) {
        Some(forward) => forward.to_string(),
        None => format!("{}{}", name, REVERSE_SUFFIX),
    }
}

/// Whether a path spec gets a reverse path. An explicit flag decides; otherwise the chain is
/// symmetric as soon as one of its types is bidirectional.
pub fn is_symmetric(path_spec: &PathSpec, chain: &Chain, snapshot: &InventorySnapshot) -> bool {
    path_spec.symmetric.unwrap_or_else(|| {
        chain.entries.iter().any(|entry| {
            snapshot.function_type(&entry.function_type).map(|def| def.bidirectional).unwrap_or(false)
        })
    })
}

/// Build the reverse of `forward` carrying `path_id`.
pub fn reverse_path(forward: &RenderedServicePath, path_id: PathId) -> RenderedServicePath {
    let hops = forward
        .hops
        .iter()
        .rev()
        .enumerate()
        .map(|(n, hop)| Hop {
            hop_number: n as u8,
            service_index: MAX_SERVICE_INDEX - n as u8,
            target: hop.target.clone(),
            forwarder: hop.forwarder.clone(),
            forwarder_locator: hop.forwarder_locator.clone(),
        })
        .collect();

    RenderedServicePath {
        name: toggle_reverse_name(&forward.name),
        path_id,
        starting_index: MAX_SERVICE_INDEX,
        symmetric_path_id: Some(forward.path_id),
        transport: forward.transport,
        encapsulation: forward.encapsulation,
        path_spec: forward.path_spec.clone(),
        chain: forward.chain.clone(),
        reverse: !forward.reverse,
        hops,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{FunctionInstance, FunctionTypeDef, HopTarget};

    fn forward() -> RenderedServicePath {
        let hop = |n: u8, f: &str, ff: &str| Hop {
            hop_number: n,
            service_index: MAX_SERVICE_INDEX - n,
            target: HopTarget::Function(f.to_string()),
            forwarder: ff.to_string(),
            forwarder_locator: Some(format!("{}-eth0", ff)),
        };
        RenderedServicePath {
            name: "web-Path-7".to_string(),
            path_id: 7,
            starting_index: MAX_SERVICE_INDEX,
            symmetric_path_id: None,
            transport: Default::default(),
            encapsulation: Default::default(),
            path_spec: "web".to_string(),
            chain: "web-chain".to_string(),
            reverse: false,
            hops: vec![hop(0, "fw-1", "s1"), hop(1, "dpi-1", "s2"), hop(2, "nat-1", "s3")],
        }
    }

    #[test]
    fn test_toggle_name() {
        assert_eq!(toggle_reverse_name("p"), "p-Reverse");
        assert_eq!(toggle_reverse_name("p-Reverse"), "p");
        assert_eq!(toggle_reverse_name(&toggle_reverse_name("abc")), "abc");
    }

    #[test]
    fn test_reverse_mirrors_hops() {
        let fwd = forward();
        let rev = reverse_path(&fwd, 4103);
        assert_eq!(rev.name, "web-Path-7-Reverse");
        assert_eq!(rev.path_id, 4103);
        assert_eq!(rev.symmetric_path_id, Some(7));
        assert!(rev.reverse);
        assert_eq!(rev.hops.len(), fwd.hops.len());
        for (n, hop) in rev.hops.iter().enumerate() {
            assert_eq!(hop.hop_number as usize, n);
            assert_eq!(hop.service_index, MAX_SERVICE_INDEX - n as u8);
            assert_eq!(hop.target, fwd.hops[fwd.hops.len() - 1 - n].target);
            assert_eq!(hop.forwarder, fwd.hops[fwd.hops.len() - 1 - n].forwarder);
        }
    }

    #[test]
    fn test_symmetry_eligibility() {
        let snapshot = InventorySnapshot::from_parts(
            vec![FunctionInstance::new("fw-1", "firewall")],
            vec![],
            vec![
                FunctionTypeDef { name: "firewall".into(), bidirectional: false, instances: vec![] },
                FunctionTypeDef { name: "dpi".into(), bidirectional: true, instances: vec![] },
            ],
            vec![],
        );
        let chain = Chain::new("c", &["firewall", "dpi"]);
        let mut spec = PathSpec::new("p", "c");
        assert!(is_symmetric(&spec, &chain, &snapshot));
        assert!(!is_symmetric(&spec, &Chain::new("c", &["firewall", "nat"]), &snapshot));
        spec.symmetric = Some(false);
        assert!(!is_symmetric(&spec, &chain, &snapshot));
    }
}
