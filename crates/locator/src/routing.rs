// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consistent-hash routing for weighted service groups.
//!
//! The Ketama construction: each member contributes a number of MD5-based
//! ring points proportional to its share of the group's total weight.
//! Lookups binary-search for the least point at or above the key's point,
//! wrapping to the start of the ring.

use std::collections::BTreeMap;

use md5::{Digest, Md5};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A named weighted set of routing destinations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingGroup {
    pub name: String,
    pub members: BTreeMap<String, u32>,
}

impl RoutingGroup {
    pub fn new(name: impl Into<String>, members: BTreeMap<String, u32>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn compile(&self) -> Continuum {
        Continuum::new(&self.members)
    }
}

/// The precomputed ring for one group. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuum {
    elements: Vec<(u32, String)>,
}

impl Continuum {
    /// Populate the ring. A member with a 100% share contributes
    /// `64 * |members|` hashes, four points each; weights scale that
    /// proportionally.
    pub fn new(members: &BTreeMap<String, u32>) -> Self {
        let length = members.len();
        let total: f64 = members.values().map(|w| f64::from(*w)).sum();
        info!(
            members = length,
            total_weight = total,
            "populating continuum"
        );

        let mut elements = Vec::new();
        if length == 0 || total == 0.0 {
            return Self { elements };
        }

        for (value, weight) in members {
            let slice = f64::from(*weight) / total;
            let steps = (slice * (64 * length) as f64).round() as u64;

            for step in 0..steps {
                let digest = Md5::new()
                    .chain_update(value.as_bytes())
                    .chain_update(step.to_le_bytes())
                    .finalize();
                for part in 0..4 {
                    let bytes = [
                        digest[part * 4],
                        digest[part * 4 + 1],
                        digest[part * 4 + 2],
                        digest[part * 4 + 3],
                    ];
                    elements.push((u32::from_le_bytes(bytes), value.clone()));
                }
            }
            debug!(
                value = %value,
                share = format!("{:.02}%", slice * 100.0),
                points = steps * 4,
                "continuum member added"
            );
        }

        elements.sort();
        let unique = elements.windows(2).all(|pair| pair[0].0 != pair[1].0);
        info!(points = elements.len(), unique, "continuum populated");

        Self { elements }
    }

    /// Map a key onto a member. The key's MD5 is folded into one point by
    /// XORing its four 32-bit parts.
    pub fn get(&self, key: &str) -> Option<&str> {
        let digest = Md5::digest(key.as_bytes());
        let mut point = 0u32;
        for part in 0..4 {
            let bytes = [
                digest[part * 4],
                digest[part * 4 + 1],
                digest[part * 4 + 2],
                digest[part * 4 + 3],
            ];
            point ^= u32::from_le_bytes(bytes);
        }
        self.lookup(point)
    }

    /// Keyless lookup at a uniformly random point.
    pub fn get_random(&self) -> Option<&str> {
        self.lookup(rand::thread_rng().gen::<u32>())
    }

    fn lookup(&self, point: u32) -> Option<&str> {
        if self.elements.is_empty() {
            return None;
        }
        let index = self.elements.partition_point(|(p, _)| *p < point);
        let entry = self.elements.get(index).or_else(|| self.elements.first())?;
        Some(&entry.1)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Points per member, for balance diagnostics.
    pub fn population(&self) -> BTreeMap<&str, usize> {
        let mut population = BTreeMap::new();
        for (_, value) in &self.elements {
            *population.entry(value.as_str()).or_insert(0) += 1;
        }
        population
    }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;
