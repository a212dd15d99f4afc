use std::sync::Arc;

use crate::openfoodfacts::{self, FetchError, Product, ProductPage};

pub trait ProductService: Send + Sync {
    fn load_page(&self, page: u32, page_size: u32) -> Result<ProductPage, FetchError>;
}

pub struct OpenFoodFactsService {
    client: Arc<openfoodfacts::Client>,
}

impl OpenFoodFactsService {
    pub fn new(client: Arc<openfoodfacts::Client>) -> Self {
        Self { client }
    }
}

impl ProductService for OpenFoodFactsService {
    fn load_page(&self, page: u32, page_size: u32) -> Result<ProductPage, FetchError> {
        self.client.products(page, page_size)
    }
}

/// Offline catalog used by `--demo`. Serves a fixed number of pages and then
/// runs dry.
pub struct SampleProductService {
    pages: u32,
}

impl SampleProductService {
    pub fn new(pages: u32) -> Self {
        Self { pages }
    }
}

impl Default for SampleProductService {
    fn default() -> Self {
        Self::new(4)
    }
}

const SAMPLE_PRODUCTS: [(&str, &str, &[&str], &[&str], Option<&str>); 8] = [
    (
        "Rolled oats",
        "a",
        &["en:plant-based-foods", "en:cereals-and-potatoes", "en:breakfast-cereals"],
        &["en:oat"],
        Some("a"),
    ),
    (
        "Hazelnut spread",
        "e",
        &["en:spreads", "en:sweet-spreads", "en:cocoa-and-hazelnuts-spreads"],
        &["en:sugar", "en:palm-oil", "en:hazelnut", "en:cocoa"],
        Some("e"),
    ),
    (
        "Sparkling water",
        "b",
        &["en:beverages", "en:waters"],
        &["en:carbonated-water"],
        None,
    ),
    (
        "greek yogurt",
        "c",
        &["en:dairies", "en:fermented-foods", "en:yogurts"],
        &["en:milk", "en:ferments"],
        Some("b"),
    ),
    (
        "",
        "x",
        &["en:unknown"],
        &[],
        Some("c"),
    ),
    (
        "Dark chocolate 70%",
        "d",
        &["en:snacks", "en:sweet-snacks", "en:chocolates"],
        &["en:cocoa-mass", "en:sugar", "en:cocoa-butter"],
        Some("d"),
    ),
    (
        "Lentil soup",
        "s",
        &["en:meals", "en:soups"],
        &["en:water", "en:lentils", "en:carrot", "en:onion", "en:salt"],
        Some("a"),
    ),
    (
        "apple juice",
        "j",
        &["en:beverages", "en:fruit-juices"],
        &["en:apple-juice"],
        Some("c"),
    ),
];

impl ProductService for SampleProductService {
    fn load_page(&self, page: u32, page_size: u32) -> Result<ProductPage, FetchError> {
        if page == 0 || page > self.pages {
            return Ok(ProductPage {
                count: Some(u64::from(self.pages) * u64::from(page_size)),
                products: Vec::new(),
            });
        }

        let products = (0..page_size)
            .map(|slot| {
                let serial = (page - 1) * page_size + slot;
                let (name, prefix, categories, ingredients, grade) =
                    SAMPLE_PRODUCTS[serial as usize % SAMPLE_PRODUCTS.len()];
                let code = format!("{prefix}{serial:06}");
                Product {
                    id: Some(code.clone()),
                    code: Some(code),
                    product_name: if name.is_empty() {
                        None
                    } else {
                        Some(format!("{name} #{serial}"))
                    },
                    image_front_small_url: None,
                    categories_hierarchy: categories.iter().map(|tag| tag.to_string()).collect(),
                    ingredients_tags: ingredients.iter().map(|tag| tag.to_string()).collect(),
                    nutrition_grades: grade.map(str::to_string),
                }
            })
            .collect();

        Ok(ProductPage {
            count: Some(u64::from(self.pages) * u64::from(page_size)),
            products,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_service_pages_then_runs_dry() {
        let service = SampleProductService::new(2);
        let first = service.load_page(1, 10).unwrap();
        let second = service.load_page(2, 10).unwrap();
        let third = service.load_page(3, 10).unwrap();
        assert_eq!(first.products.len(), 10);
        assert_eq!(second.products.len(), 10);
        assert!(third.products.is_empty());
        assert_ne!(first.products[0].code, second.products[0].code);
    }

    #[test]
    fn sample_service_includes_nameless_records() {
        let service = SampleProductService::default();
        let page = service.load_page(1, 8).unwrap();
        assert!(page
            .products
            .iter()
            .any(|product| product.display_name().is_none()));
    }
}
