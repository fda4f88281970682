//! Fixed lists of job-board area and specialization ids offered to the UI when
//! configuring a run.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    pub id: &'static str,
    pub name: &'static str,
}

const fn entry(id: &'static str, name: &'static str) -> CatalogueEntry {
    CatalogueEntry { id, name }
}

/// IT-related specializations.
pub const SPECIALIZATIONS: &[CatalogueEntry] = &[
    entry("1", "Information technology"),
    entry("1.221", "Programming, development"),
    entry("1.3", "Testing"),
    entry("1.9", "System administration"),
    entry("1.10", "Networks, telecom"),
    entry("1.25", "Data science"),
    entry("1.82", "DevOps"),
    entry("1.110", "Machine learning"),
    entry("1.113", "Information security"),
    entry("1.117", "Technical support"),
    entry("1.200", "Project management"),
    entry("1.211", "Analytics"),
    entry("1.272", "Artificial intelligence"),
    entry("1.327", "CTO, VP"),
    entry("1.400", "Product management"),
    entry("1.420", "Interface design"),
    entry("1.474", "Robotics"),
    entry("1.536", "Technical writing"),
];

/// Major cities.
pub const CITIES: &[CatalogueEntry] = &[
    entry("1", "Moscow"),
    entry("2", "Saint Petersburg"),
    entry("3", "Yekaterinburg"),
    entry("4", "Novosibirsk"),
    entry("41", "Kaliningrad"),
    entry("54", "Krasnoyarsk"),
    entry("66", "Nizhny Novgorod"),
    entry("88", "Kazan"),
    entry("104", "Voronezh"),
    entry("113", "Rostov-on-Don"),
    entry("159", "Samara"),
    entry("1438", "Krasnodar"),
];
