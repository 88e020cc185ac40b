use std::collections::BTreeSet;
use std::fmt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::DagError;

/// Identifier of one logical execution slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Fixed, ordered set of logical execution slots for one run.
///
/// The pool holds no mutable state, so `pick` can be called from any number
/// of concurrently running tasks as long as each brings its own RNG.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    resources: Vec<ResourceId>,
}

impl ResourcePool {
    /// Pool of `size` slots named `VM-1` .. `VM-<size>`.
    pub fn with_size(size: usize) -> Self {
        Self {
            resources: (1..=size).map(|i| ResourceId::new(format!("VM-{}", i))).collect(),
        }
    }

    pub fn from_ids<I, R>(ids: I) -> Result<Self, DagError>
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        let resources: Vec<ResourceId> = ids.into_iter().map(Into::into).collect();
        let unique: BTreeSet<&ResourceId> = resources.iter().collect();
        if unique.len() != resources.len() {
            return Err(DagError::InvalidConfig(
                "resource pool contains duplicate ids".to_string(),
            ));
        }
        Ok(Self { resources })
    }

    /// Uniformly pick a resource that is not in `excluding`.
    pub fn pick<R: Rng + ?Sized>(
        &self,
        excluding: &[ResourceId],
        rng: &mut R,
    ) -> Result<ResourceId, DagError> {
        let candidates: Vec<&ResourceId> = self
            .resources
            .iter()
            .filter(|id| !excluding.contains(id))
            .collect();

        if candidates.is_empty() {
            return Err(DagError::NoResourceAvailable {
                pool_size: self.resources.len(),
            });
        }

        let index = rng.gen_range(0..candidates.len());
        Ok(candidates[index].clone())
    }

    pub fn resources(&self) -> &[ResourceId] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn names_slots_like_vms() {
        let pool = ResourcePool::with_size(3);
        let names: Vec<&str> = pool.resources().iter().map(|r| r.as_str()).collect();
        assert_eq!(names, vec!["VM-1", "VM-2", "VM-3"]);
    }

    #[test]
    fn pick_skips_excluded_resources() {
        let pool = ResourcePool::with_size(3);
        let mut rng = StdRng::seed_from_u64(7);
        let excluding = vec![ResourceId::from("VM-1"), ResourceId::from("VM-3")];
        for _ in 0..50 {
            assert_eq!(pool.pick(&excluding, &mut rng).unwrap().as_str(), "VM-2");
        }
    }

    #[test]
    fn pick_fails_when_everything_is_excluded() {
        let pool = ResourcePool::with_size(2);
        let mut rng = StdRng::seed_from_u64(7);
        let all = pool.resources().to_vec();
        assert!(matches!(
            pool.pick(&all, &mut rng),
            Err(DagError::NoResourceAvailable { pool_size: 2 })
        ));
    }

    #[test]
    fn pick_reaches_every_slot() {
        let pool = ResourcePool::with_size(3);
        let mut rng = StdRng::seed_from_u64(42);
        let seen: BTreeSet<ResourceId> = (0..200).map(|_| pool.pick(&[], &mut rng).unwrap()).collect();
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn rejects_duplicate_ids() {
        assert!(ResourcePool::from_ids(["a", "b", "a"]).is_err());
        assert_eq!(ResourcePool::from_ids(["a", "b"]).unwrap().len(), 2);
    }
}
