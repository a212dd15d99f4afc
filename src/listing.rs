use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::feed::FeedState;
use crate::openfoodfacts::Product;

pub const NO_GRADE: &str = "Not available";
pub const NO_IMAGE: &str = "No image";
pub const NO_CATEGORIES: &str = "No categories available";
pub const NO_INGREDIENTS: &str = "No ingredients available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortKey {
    #[serde(rename = "product-name-asc")]
    NameAsc,
    #[serde(rename = "product-name-desc")]
    NameDesc,
    #[default]
    #[serde(rename = "nutrition-grade-asc")]
    GradeAsc,
    #[serde(rename = "nutrition-grade-desc")]
    GradeDesc,
}

impl SortKey {
    pub const ALL: [SortKey; 4] = [
        SortKey::NameAsc,
        SortKey::NameDesc,
        SortKey::GradeAsc,
        SortKey::GradeDesc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::NameAsc => "product-name-asc",
            SortKey::NameDesc => "product-name-desc",
            SortKey::GradeAsc => "nutrition-grade-asc",
            SortKey::GradeDesc => "nutrition-grade-desc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::NameAsc => "Name (A-Z)",
            SortKey::NameDesc => "Name (Z-A)",
            SortKey::GradeAsc => "Nutrition grade (A-E)",
            SortKey::GradeDesc => "Nutrition grade (E-A)",
        }
    }

    pub fn next(self) -> Self {
        self.shifted(1)
    }

    pub fn previous(self) -> Self {
        self.shifted(Self::ALL.len() - 1)
    }

    fn shifted(self, by: usize) -> Self {
        let index = Self::ALL.iter().position(|key| *key == self).unwrap_or(0);
        Self::ALL[(index + by) % Self::ALL.len()]
    }

    fn descending(&self) -> bool {
        matches!(self, SortKey::NameDesc | SortKey::GradeDesc)
    }

    fn sort_value(&self, product: &Product) -> String {
        match self {
            SortKey::NameAsc | SortKey::NameDesc => product
                .product_name
                .as_deref()
                .unwrap_or_default()
                .to_lowercase(),
            SortKey::GradeAsc | SortKey::GradeDesc => {
                product.nutrition_grades.clone().unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        match SortKey::ALL
            .iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(value))
        {
            Some(key) => Ok(*key),
            None => bail!(
                "unknown sort key {value:?} (expected one of {})",
                SortKey::ALL.map(|key| key.as_str()).join(", ")
            ),
        }
    }
}

/// Indices of the displayable records, ordered by `key`.
///
/// Nameless records are left out. The sort is stable in both directions, so
/// equal keys keep the order in which pages arrived.
pub fn project(records: &[Product], key: SortKey) -> Vec<usize> {
    let mut entries: Vec<(usize, String)> = records
        .iter()
        .enumerate()
        .filter(|(_, product)| product.display_name().is_some())
        .map(|(index, product)| (index, key.sort_value(product)))
        .collect();

    let descending = key.descending();
    entries.sort_by(|(_, left), (_, right)| {
        let order: Ordering = left.cmp(right);
        if descending {
            order.reverse()
        } else {
            order
        }
    });

    entries.into_iter().map(|(index, _)| index).collect()
}

/// Sorted view over the feed. Recomputes only when the feed revision or the
/// sort key moves.
#[derive(Debug, Clone, Default)]
pub struct ProductList {
    key: SortKey,
    computed_for: Option<(u64, SortKey)>,
    projection: Vec<usize>,
}

impl ProductList {
    pub fn new(key: SortKey) -> Self {
        Self {
            key,
            computed_for: None,
            projection: Vec::new(),
        }
    }

    pub fn sort_key(&self) -> SortKey {
        self.key
    }

    pub fn set_sort_key(&mut self, key: SortKey) -> bool {
        if self.key == key {
            return false;
        }
        tracing::info!(from = %self.key, to = %key, "sort key changed");
        self.key = key;
        true
    }

    /// Brings the projection up to date. Returns `true` if it was rebuilt.
    pub fn refresh(&mut self, state: &FeedState) -> bool {
        let stamp = (state.revision(), self.key);
        if self.computed_for == Some(stamp) {
            return false;
        }
        self.projection = project(state.records(), self.key);
        self.computed_for = Some(stamp);
        true
    }

    pub fn projection(&self) -> &[usize] {
        &self.projection
    }

    pub fn len(&self) -> usize {
        self.projection.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projection.is_empty()
    }

    pub fn products<'a>(&'a self, state: &'a FeedState) -> impl Iterator<Item = &'a Product> + 'a {
        self.projection
            .iter()
            .filter_map(move |index| state.records().get(*index))
    }
}

/// Display-ready fields of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductCard {
    pub name: String,
    pub image: String,
    pub categories: String,
    pub ingredients: String,
    pub grade: String,
}

impl ProductCard {
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.display_name().unwrap_or_default().to_string(),
            image: product
                .image_front_small_url
                .clone()
                .filter(|url| !url.is_empty())
                .unwrap_or_else(|| NO_IMAGE.to_string()),
            categories: join_tags(&product.categories_hierarchy)
                .unwrap_or_else(|| NO_CATEGORIES.to_string()),
            ingredients: join_tags(&product.ingredients_tags)
                .unwrap_or_else(|| NO_INGREDIENTS.to_string()),
            grade: product
                .nutrition_grades
                .clone()
                .filter(|grade| !grade.is_empty())
                .unwrap_or_else(|| NO_GRADE.to_string()),
        }
    }
}

/// `"en:organic"` -> `"organic"`. Tags without a language prefix pass through.
pub fn tag_label(tag: &str) -> &str {
    match tag.split_once(':') {
        Some((_, label)) => label,
        None => tag,
    }
}

pub fn join_tags(tags: &[String]) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    Some(
        tags.iter()
            .map(|tag| tag_label(tag))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: Option<&str>, grade: Option<&str>) -> Product {
        Product {
            product_name: name.map(str::to_string),
            nutrition_grades: grade.map(str::to_string),
            ..Product::default()
        }
    }

    fn names(records: &[Product], order: &[usize]) -> Vec<String> {
        order
            .iter()
            .map(|index| records[*index].product_name.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn name_ascending_ignores_case() {
        let records = vec![product(Some("Banana"), Some("b")), product(Some("apple"), Some("a"))];
        let order = project(&records, SortKey::NameAsc);
        assert_eq!(names(&records, &order), vec!["apple", "Banana"]);
    }

    #[test]
    fn grade_descending_orders_letters() {
        let records = vec![product(Some("Banana"), Some("b")), product(Some("apple"), Some("a"))];
        let order = project(&records, SortKey::GradeDesc);
        assert_eq!(names(&records, &order), vec!["Banana", "apple"]);
    }

    #[test]
    fn nameless_records_are_excluded_once() {
        let records = vec![
            product(Some("Tea"), None),
            product(None, Some("a")),
            product(Some(""), Some("b")),
            product(Some("Coffee"), Some("c")),
        ];
        for key in SortKey::ALL {
            let mut order = project(&records, key);
            order.sort_unstable();
            assert_eq!(order, vec![0, 3], "key {key}");
        }
    }

    #[test]
    fn missing_grade_sorts_first_ascending() {
        let records = vec![
            product(Some("B"), Some("c")),
            product(Some("A"), None),
            product(Some("C"), Some("a")),
        ];
        assert_eq!(
            names(&records, &project(&records, SortKey::GradeAsc)),
            vec!["A", "C", "B"]
        );
        assert_eq!(
            names(&records, &project(&records, SortKey::GradeDesc)),
            vec!["B", "C", "A"]
        );
    }

    #[test]
    fn ties_keep_accumulation_order() {
        let records = vec![
            product(Some("first"), Some("b")),
            product(Some("second"), Some("a")),
            product(Some("third"), Some("b")),
            product(Some("FIRST"), Some("a")),
        ];
        assert_eq!(project(&records, SortKey::GradeAsc), vec![1, 3, 0, 2]);
        assert_eq!(project(&records, SortKey::GradeDesc), vec![0, 2, 1, 3]);
        assert_eq!(project(&records, SortKey::NameAsc), vec![0, 3, 1, 2]);
        assert_eq!(project(&records, SortKey::NameDesc), vec![2, 1, 0, 3]);
    }

    #[test]
    fn projection_is_ordered_and_idempotent() {
        let records: Vec<Product> = ["d", "a", "", "c", "e", "a", "b"]
            .iter()
            .enumerate()
            .map(|(index, grade)| {
                let name = format!("item-{}", (7 - index) % 4);
                product(Some(name.as_str()), Some(grade).filter(|grade| !grade.is_empty()).copied())
            })
            .collect();
        for key in SortKey::ALL {
            let first = project(&records, key);
            assert_eq!(first, project(&records, key));
            for pair in first.windows(2) {
                let left = key.sort_value(&records[pair[0]]);
                let right = key.sort_value(&records[pair[1]]);
                let order = left.cmp(&right);
                if key.descending() {
                    assert_ne!(order, Ordering::Less);
                } else {
                    assert_ne!(order, Ordering::Greater);
                }
                if order == Ordering::Equal {
                    assert!(pair[0] < pair[1]);
                }
            }
        }
    }

    #[test]
    fn product_list_recomputes_on_change_only() {
        let mut list = ProductList::default();
        let state = FeedState::default();
        assert_eq!(list.sort_key(), SortKey::GradeAsc);
        assert!(list.refresh(&state));
        assert!(!list.refresh(&state));
        assert!(list.set_sort_key(SortKey::NameDesc));
        assert!(!list.set_sort_key(SortKey::NameDesc));
        assert!(list.refresh(&state));
        assert!(list.is_empty());
    }

    #[test]
    fn sort_key_round_trips_through_strings() {
        for key in SortKey::ALL {
            assert_eq!(key.as_str().parse::<SortKey>().unwrap(), key);
        }
        assert!("price-asc".parse::<SortKey>().is_err());
        assert_eq!(SortKey::GradeDesc.next(), SortKey::NameAsc);
        assert_eq!(SortKey::NameAsc.previous(), SortKey::GradeDesc);
    }

    #[test]
    fn tag_label_strips_language_prefix() {
        assert_eq!(tag_label("en:organic"), "organic");
        assert_eq!(tag_label("fr:lait:entier"), "lait:entier");
        assert_eq!(tag_label("salt"), "salt");
    }

    #[test]
    fn card_maps_fields_and_placeholders() {
        let full = Product {
            product_name: Some("Granola".into()),
            image_front_small_url: Some("https://images.example/granola.jpg".into()),
            categories_hierarchy: vec!["en:breakfasts".into(), "en:cereals".into()],
            ingredients_tags: vec!["en:oat".into(), "en:honey".into(), "en:almond".into()],
            nutrition_grades: Some("b".into()),
            ..Product::default()
        };
        let card = ProductCard::from_product(&full);
        assert_eq!(card.name, "Granola");
        assert_eq!(card.image, "https://images.example/granola.jpg");
        assert_eq!(card.categories, "breakfasts, cereals");
        assert_eq!(card.ingredients, "oat, honey, almond");
        assert_eq!(card.grade, "b");

        let bare = ProductCard::from_product(&product(Some("Water"), None));
        assert_eq!(bare.image, NO_IMAGE);
        assert_eq!(bare.categories, NO_CATEGORIES);
        assert_eq!(bare.ingredients, NO_INGREDIENTS);
        assert_eq!(bare.grade, NO_GRADE);
    }
}
