//! Keyword-scored category and region tagging, plus the reference tables
//! the store seeds from.

/// Region assigned when no region keyword matches.
pub const DEFAULT_REGION: &str = "global";

pub struct CategoryInfo {
    pub slug: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

pub struct RegionInfo {
    pub slug: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
}

pub const CATEGORIES: &[CategoryInfo] = &[
    CategoryInfo {
        slug: "conflicts",
        name: "Conflicts & Security",
        icon: "⚔️",
        description: "Armed conflicts, military affairs, security",
    },
    CategoryInfo {
        slug: "diplomacy",
        name: "Diplomacy",
        icon: "🤝",
        description: "International relations, treaties, summits",
    },
    CategoryInfo {
        slug: "trade",
        name: "Trade & Economics",
        icon: "💰",
        description: "International trade, sanctions, economic policy",
    },
    CategoryInfo {
        slug: "elections",
        name: "Elections & Governance",
        icon: "🗳️",
        description: "Elections, political transitions, governance",
    },
    CategoryInfo {
        slug: "climate",
        name: "Climate & Energy",
        icon: "🌡️",
        description: "Climate politics, energy security, resources",
    },
    CategoryInfo {
        slug: "technology",
        name: "Technology & Cyber",
        icon: "🔐",
        description: "Tech policy, cybersecurity, digital sovereignty",
    },
];

pub const REGIONS: &[RegionInfo] = &[
    RegionInfo { slug: "americas", name: "Americas", icon: "🌎" },
    RegionInfo { slug: "europe", name: "Europe", icon: "🇪🇺" },
    RegionInfo { slug: "mena", name: "Middle East & North Africa", icon: "🌍" },
    RegionInfo { slug: "asia-pacific", name: "Asia-Pacific", icon: "🌏" },
    RegionInfo { slug: "africa", name: "Sub-Saharan Africa", icon: "🌍" },
    RegionInfo { slug: DEFAULT_REGION, name: "Global", icon: "🌐" },
];

/// Ordered (slug, keywords) table. Order decides ties.
pub type KeywordTable = &'static [(&'static str, &'static [&'static str])];

pub const CATEGORY_KEYWORDS: KeywordTable = &[
    (
        "conflicts",
        &[
            "war", "military", "attack", "troops", "defense", "army", "weapons", "missile",
            "bomb", "conflict", "battle", "invasion",
        ],
    ),
    (
        "diplomacy",
        &[
            "summit", "treaty", "ambassador", "diplomatic", "negotiations", "talks",
            "alliance", "relations", "foreign minister", "UN",
        ],
    ),
    (
        "trade",
        &[
            "trade", "tariff", "sanctions", "economy", "export", "import", "economic",
            "investment", "market", "currency",
        ],
    ),
    (
        "elections",
        &[
            "election", "vote", "democracy", "president", "parliament", "government",
            "political", "campaign", "referendum",
        ],
    ),
    (
        "climate",
        &[
            "climate", "carbon", "emissions", "renewable", "energy", "oil", "gas",
            "environment", "green", "sustainability",
        ],
    ),
    (
        "technology",
        &[
            "cyber", "technology", "AI", "artificial intelligence", "data", "privacy",
            "digital", "tech", "internet", "surveillance",
        ],
    ),
];

pub const REGION_KEYWORDS: KeywordTable = &[
    (
        "americas",
        &[
            "US", "USA", "United States", "America", "Canada", "Mexico", "Brazil",
            "Latin America", "Washington", "Biden", "Trump",
        ],
    ),
    (
        "europe",
        &[
            "Europe", "EU", "European", "NATO", "Germany", "France", "UK", "Britain",
            "Brussels", "London", "Paris", "Berlin", "Ukraine", "Russia",
        ],
    ),
    (
        "mena",
        &[
            "Middle East", "Israel", "Palestine", "Gaza", "Iran", "Saudi", "Syria", "Iraq",
            "Egypt", "Turkey", "Arab", "Gulf",
        ],
    ),
    (
        "asia-pacific",
        &[
            "China", "Japan", "Korea", "India", "Taiwan", "Asia", "Pacific", "ASEAN",
            "Beijing", "Tokyo", "Southeast Asia", "Australia",
        ],
    ),
    (
        "africa",
        &[
            "Africa", "African", "Nigeria", "South Africa", "Kenya", "Ethiopia", "Congo",
            "Sahel",
        ],
    ),
];

/// Number of keywords that occur as substrings of `text`.
fn score(text: &str, keywords: &[&str], case_insensitive: bool) -> usize {
    keywords
        .iter()
        .filter(|kw| {
            if case_insensitive {
                text.contains(kw.to_lowercase().as_str())
            } else {
                text.contains(*kw)
            }
        })
        .count()
}

/// Highest-scoring tag, or `None` if nothing scored.
///
/// Only a strictly greater score replaces the current best, so ties go to
/// the tag listed first in `table`.
pub fn best_match(text: &str, table: KeywordTable, case_insensitive: bool) -> Option<&'static str> {
    let mut best: Option<(&'static str, usize)> = None;
    for (slug, keywords) in table {
        let s = score(text, keywords, case_insensitive);
        if s == 0 {
            continue;
        }
        match best {
            Some((_, top)) if s <= top => {}
            _ => best = Some((slug, s)),
        }
    }
    best.map(|(slug, _)| slug)
}

/// Best-effort topical category. Matching ignores case.
pub fn classify_category(title: &str, summary: &str) -> Option<&'static str> {
    let text = format!("{} {}", title, summary).to_lowercase();
    best_match(&text, CATEGORY_KEYWORDS, true)
}

/// Best-effort region. Matching is case-sensitive so that short proper-noun
/// keywords ("US", "EU") do not fire inside ordinary words; falls back to
/// [`DEFAULT_REGION`] rather than `None`.
pub fn classify_region(title: &str, summary: &str) -> &'static str {
    let text = format!("{} {}", title, summary);
    best_match(&text, REGION_KEYWORDS, false).unwrap_or(DEFAULT_REGION)
}
