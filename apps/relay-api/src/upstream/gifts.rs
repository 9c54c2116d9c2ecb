//! Catalog of known platform gifts and their diamond values.

use serde_json::Value;

use super::normalize::{first_str, first_u64};

/// Label used when a gift has neither a known id nor a usable name.
pub const UNKNOWN_GIFT_LABEL: &str = "Regalo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiftInfo {
    pub gift_id: u64,
    /// Name shown to viewers.
    pub name: &'static str,
    pub name_en: &'static str,
    pub diamonds: u64,
}

const fn gift(gift_id: u64, name: &'static str, name_en: &'static str, diamonds: u64) -> GiftInfo {
    GiftInfo {
        gift_id,
        name,
        name_en,
        diamonds,
    }
}

/// Known gifts, ordered by id.
pub static CATALOG: [GiftInfo; 30] = [
    gift(1, "Rosa", "Rose", 1),
    gift(2, "Panda", "Panda", 5),
    gift(3, "Perfume", "Perfume", 20),
    gift(4, "Te Amo", "I Love You", 49),
    gift(5, "Confeti", "Confetti", 100),
    gift(6, "Gafas de Sol", "Sunglasses", 199),
    gift(7, "Lluvia de Dinero", "Money Rain", 500),
    gift(8, "Bola de Disco", "Disco Ball", 1000),
    gift(9, "Sirena", "Mermaid", 2988),
    gift(10, "Avión", "Airplane", 6000),
    gift(11, "Planeta", "Planet", 15000),
    gift(12, "Vuelo Diamante", "Diamond Flight", 18000),
    gift(13, "León", "Lion", 29999),
    gift(14, "TikTok Universe", "TikTok Universe", 44999),
    gift(15, "Corazón", "Heart", 1),
    gift(16, "Corona", "Crown", 9999),
    gift(17, "Fuego", "Fire", 99),
    gift(18, "Estrella", "Star", 50),
    gift(19, "Cake", "Cake", 299),
    gift(20, "Diamante", "Diamond", 5000),
    gift(21, "Beso", "Kiss", 10),
    gift(22, "Cerveza", "Beer", 30),
    gift(23, "Pizza", "Pizza", 50),
    gift(24, "Cofre", "Treasure", 200),
    gift(25, "Rayo", "Lightning", 150),
    gift(26, "Tornado", "Tornado", 800),
    gift(27, "Dragón", "Dragon", 12000),
    gift(28, "Fénix", "Phoenix", 20000),
    gift(29, "Galaxia", "Galaxy", 25000),
    gift(30, "Universo", "Universe", 50000),
];

pub fn by_id(gift_id: u64) -> Option<&'static GiftInfo> {
    CATALOG.iter().find(|g| g.gift_id == gift_id)
}

/// Case-insensitive lookup: exact match on either name, else the first entry
/// whose name contains `name`. Blank names never match.
pub fn by_name(name: &str) -> Option<&'static GiftInfo> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    CATALOG
        .iter()
        .find(|g| g.name.to_lowercase() == needle || g.name_en.to_lowercase() == needle)
        .or_else(|| {
            CATALOG.iter().find(|g| {
                g.name.to_lowercase().contains(&needle) || g.name_en.to_lowercase().contains(&needle)
            })
        })
}

/// Canonical name and per-unit value resolved for a raw gift payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGift {
    pub gift_id: u64,
    pub name: String,
    pub diamonds: u64,
}

/// Resolve a raw gift payload: catalog id first, then catalog name, then the
/// payload's own name and diamond count.
pub fn resolve(payload: &Value) -> ResolvedGift {
    let gift_id = first_u64(payload, &["/giftId", "/gift/gift_id", "/gift/giftId"]).unwrap_or(0);

    if let Some(info) = by_id(gift_id) {
        return ResolvedGift::from_info(gift_id, info);
    }

    let raw_name = first_str(payload, &["/giftName", "/gift/name", "/gift/gift_name"]);
    if let Some(info) = raw_name.as_deref().and_then(by_name) {
        return ResolvedGift::from_info(gift_id, info);
    }

    let diamonds = first_u64(
        payload,
        &["/diamondCount", "/gift/diamondCount", "/gift/diamond_count"],
    )
    .unwrap_or(0);

    ResolvedGift {
        gift_id,
        name: raw_name.unwrap_or_else(|| UNKNOWN_GIFT_LABEL.to_string()),
        diamonds,
    }
}

impl ResolvedGift {
    fn from_info(gift_id: u64, info: &GiftInfo) -> Self {
        Self {
            gift_id,
            name: info.name.to_string(),
            diamonds: info.diamonds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn catalog_ids_are_unique_and_ordered() {
        assert!(CATALOG.windows(2).all(|w| w[0].gift_id < w[1].gift_id));
    }

    #[test]
    fn known_id_without_name_uses_catalog() {
        let resolved = resolve(&json!({ "giftId": 5, "diamondCount": 999 }));
        assert_eq!(resolved.name, "Confeti");
        assert_eq!(resolved.diamonds, 100);
    }

    #[test]
    fn nested_gift_id_is_found() {
        let resolved = resolve(&json!({ "gift": { "gift_id": 13 } }));
        assert_eq!(resolved.name, "León");
        assert_eq!(resolved.diamonds, 29999);
    }

    #[test]
    fn unknown_id_resolves_by_english_name() {
        let resolved = resolve(&json!({ "giftId": 9001, "giftName": "Disco Ball" }));
        assert_eq!(resolved.name, "Bola de Disco");
        assert_eq!(resolved.diamonds, 1000);
        assert_eq!(resolved.gift_id, 9001);
    }

    #[test]
    fn unknown_id_and_name_fall_back_to_raw_values() {
        let resolved = resolve(&json!({ "giftId": 9001, "giftName": "Hyperdrive", "diamondCount": 321 }));
        assert_eq!(resolved.name, "Hyperdrive");
        assert_eq!(resolved.diamonds, 321);
    }

    #[test]
    fn nothing_usable_gets_generic_label() {
        let resolved = resolve(&json!({ "gift": { "diamond_count": "12" } }));
        assert_eq!(resolved.name, UNKNOWN_GIFT_LABEL);
        assert_eq!(resolved.diamonds, 12);
    }

    #[test]
    fn blank_name_never_matches() {
        assert!(by_name("   ").is_none());
    }

    #[test]
    fn substring_match_uses_either_name() {
        // Exact match wins over an earlier substring match.
        assert_eq!(by_name("universe").unwrap().gift_id, 30);
        assert_eq!(by_name("DRAGÓN").unwrap().gift_id, 27);
        assert_eq!(by_name("disco").unwrap().gift_id, 8);
    }
}
