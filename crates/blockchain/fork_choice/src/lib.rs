use std::collections::HashMap;

use rean_types::{
    attestation::SignedAttestation,
    block::Block,
    primitives::H256,
};

/// Compute the LMD GHOST head of the chain, given a starting root, a set
/// of blocks, the latest attestation per validator, and a minimum score
/// threshold.
///
/// A zero `start_root` means "the earliest known block". Each validator's
/// vote weights the attested head block and all of its ancestors above
/// the start slot. Descent picks, at every level, the child with the
/// highest weight, breaking ties by higher slot and then by
/// lexicographically greater root.
pub fn ghost_head(
    blocks: &HashMap<H256, Block>,
    mut start_root: H256,
    attestations: &HashMap<u64, SignedAttestation>,
    min_score: u64,
) -> H256 {
    if blocks.is_empty() {
        return start_root;
    }
    if start_root == H256::ZERO {
        start_root = *blocks
            .iter()
            .min_by_key(|(_, block)| block.slot)
            .map(|(root, _)| root)
            .expect("we already checked blocks is non-empty");
    }
    let Some(start_block) = blocks.get(&start_root) else {
        return start_root;
    };
    let start_slot = start_block.slot;

    // Count votes per block; a vote for a block counts for every
    // ancestor above the start slot.
    let mut weights: HashMap<H256, u64> = HashMap::new();
    for attestation in attestations.values() {
        let mut current = attestation.message.data.head.root;
        while let Some(block) = blocks.get(&current)
            && block.slot > start_slot
        {
            *weights.entry(current).or_default() += 1;
            current = block.parent_root;
        }
    }

    // Adjacency of blocks meeting the minimum score.
    let mut children: HashMap<H256, Vec<H256>> = HashMap::new();
    for (root, block) in blocks {
        if block.parent_root == H256::ZERO {
            continue;
        }
        if weights.get(root).copied().unwrap_or(0) < min_score {
            continue;
        }
        children.entry(block.parent_root).or_default().push(*root);
    }

    // Walk down the tree, choosing the best child at each level.
    let mut head = start_root;
    while let Some(candidates) = children.get(&head)
        && !candidates.is_empty()
    {
        head = *candidates
            .iter()
            .max_by_key(|root| {
                (
                    weights.get(*root).copied().unwrap_or(0),
                    blocks[*root].slot,
                    **root,
                )
            })
            .expect("checked it's not empty");
    }

    head
}
