// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

/// Kind of an [`Entity`](crate::Entity).
///
/// Each driver belongs to a broader _clusto type_, e.g. both `pool` and
/// `exclusivepool` are of type `pool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Driver {
    name: &'static str,
    clusto_type: &'static str,
}

const fn driver(name: &'static str, clusto_type: &'static str) -> Driver {
    Driver { name, clusto_type }
}

/// All registered drivers, ordered by name.
static DRIVERS: &[Driver] = &[
    driver("basicconsoleserver", "consoleserver"),
    driver("basicdatacenter", "datacenter"),
    driver("basicnetworkswitch", "networkswitch"),
    driver("basicpowerstrip", "powerstrip"),
    driver("basicrack", "rack"),
    driver("basicserver", "server"),
    driver("basicvirtualserver", "virtualserver"),
    driver("clustometa", "clustometa"),
    driver("entity", "entity"),
    driver("exclusivepool", "pool"),
    driver("location", "location"),
    driver("pool", "pool"),
];

impl Driver {
    /// Driver of the single meta entity that records the schema version.
    pub const CLUSTO_META: &'static str = "clustometa";

    #[must_use]
    pub fn all() -> &'static [Self] {
        DRIVERS
    }

    /// Looks up a registered driver by name.
    #[must_use]
    pub fn lookup(name: &str) -> Option<&'static Self> {
        DRIVERS
            .binary_search_by(|driver| driver.name.cmp(name))
            .ok()
            .map(|index| &DRIVERS[index])
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn clusto_type(&self) -> &'static str {
        self.clusto_type
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
