//! Registry of named, time-bounded regions
//!
//! Regions are declared by the host per execution unit and may be
//! declared, redeclared and ended from any thread while ingestion is
//! running. Every operation takes the registry lock exactly once and
//! releases it before returning, so the ingestion thread never holds it
//! across parsing or tree updates.

use crate::error::{Error, Result};
use crate::timestamp::Timestamp;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Inclusive time window of a region; `None` means unbounded on that side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionWindow {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl RegionWindow {
    /// Returns true if `ts` lies inside the window (both bounds inclusive)
    pub fn contains(&self, ts: i64) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts <= end)
    }
}

/// One (unit, name) entry as seen at snapshot time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRegion {
    pub unit: String,
    pub name: String,
    pub window: RegionWindow,
}

/// Thread-safe store of region windows keyed by (unit id, region name)
#[derive(Debug, Default)]
pub struct RegionRegistry {
    /// unit id -> region name -> window
    units: Mutex<HashMap<String, HashMap<String, RegionWindow>>>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single assignment, so a writer that panicked while
    // holding the lock cannot have left a torn window behind.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, RegionWindow>>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or replace the window for (`unit`, `name`)
    ///
    /// A redeclaration replaces the previous window entirely: the start is
    /// taken from `ts` (unbounded below if unknown) and any earlier end is
    /// dropped. Carrying the old end over to the new start is the other
    /// possible reading; a re-begun region is treated as open until it is
    /// ended again.
    pub fn begin(&self, name: &str, unit: &str, ts: Timestamp) {
        let window = RegionWindow {
            start: ts.known(),
            end: None,
        };
        debug!(region = name, unit, start = %ts, "region begin");
        self.lock()
            .entry(unit.to_string())
            .or_default()
            .insert(name.to_string(), window);
    }

    /// Set the end bound of (`unit`, `name`)
    ///
    /// An unknown timestamp leaves the region open-ended and is never an
    /// error. A known timestamp for a region that was never declared is
    /// rejected.
    pub fn end(&self, name: &str, unit: &str, ts: Timestamp) -> Result<()> {
        let Some(end) = ts.known() else {
            debug!(region = name, unit, "region end with unknown timestamp ignored");
            return Ok(());
        };

        let mut units = self.lock();
        match units.get_mut(unit).and_then(|regions| regions.get_mut(name)) {
            Some(window) => {
                window.end = Some(end);
                debug!(region = name, unit, end, "region end");
                Ok(())
            }
            None => Err(Error::UndeclaredRegion {
                unit: unit.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Names of every region declared for `unit` whose window contains `ts`
    pub fn matching_regions(&self, unit: &str, ts: i64) -> BTreeSet<String> {
        self.lookup(unit, ts).unwrap_or_default()
    }

    /// Like [`matching_regions`](Self::matching_regions), but returns `None`
    /// when `unit` has no regions declared at all
    pub fn lookup(&self, unit: &str, ts: i64) -> Option<BTreeSet<String>> {
        let units = self.lock();
        let regions = units.get(unit)?;
        Some(
            regions
                .iter()
                .filter(|(_, window)| window.contains(ts))
                .map(|(name, _)| name.clone())
                .collect(),
        )
    }

    /// Current window of (`unit`, `name`), if declared
    pub fn window(&self, unit: &str, name: &str) -> Option<RegionWindow> {
        self.lock()
            .get(unit)
            .and_then(|regions| regions.get(name))
            .copied()
    }

    /// Copy of every declared region, ordered by (unit, name)
    pub fn snapshot(&self) -> Vec<DeclaredRegion> {
        let units = self.lock();
        let mut regions: Vec<DeclaredRegion> = units
            .iter()
            .flat_map(|(unit, regions)| {
                regions.iter().map(move |(name, window)| DeclaredRegion {
                    unit: unit.clone(),
                    name: name.clone(),
                    window: *window,
                })
            })
            .collect();
        regions.sort_by(|a, b| (&a.unit, &a.name).cmp(&(&b.unit, &b.name)));
        regions
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values().all(HashMap::is_empty)
    }
}
