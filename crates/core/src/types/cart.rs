//! Cart item composed by the client before checkout.

use serde::{Deserialize, Serialize};

use super::id::{ProductId, VariationId};
use super::quantity::Quantity;

/// One line the patient wants to add to the store cart.
///
/// Built in the UI and either posted to the cart endpoint or encoded into a
/// checkout redirect URL. Never stored by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_id: Option<VariationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub quantity: Quantity,
}

impl CartItem {
    /// The id the store should add: the variation when chosen, else the product.
    #[must_use]
    pub fn purchasable_id(&self) -> u64 {
        self.variation_id
            .map_or_else(|| self.product_id.as_u64(), |v| v.as_u64())
    }

    /// Variation attributes as `(name, value)` pairs, skipping blanks.
    #[must_use]
    pub fn variation_attributes(&self) -> Vec<(&'static str, &str)> {
        [("size", self.size.as_deref()), ("color", self.color.as_deref())]
            .into_iter()
            .filter_map(|(name, value)| {
                value
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (name, v))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let item: CartItem = serde_json::from_str(
            r#"{"productId": 10, "variationId": "11", "size": "M", "quantity": 2}"#,
        )
        .unwrap();
        assert_eq!(item.product_id.as_u64(), 10);
        assert_eq!(item.purchasable_id(), 11);
        assert_eq!(item.variation_attributes(), vec![("size", "M")]);
    }

    #[test]
    fn test_rejects_bad_quantity() {
        assert!(
            serde_json::from_str::<CartItem>(r#"{"productId": 10, "quantity": 0}"#).is_err()
        );
    }

    #[test]
    fn test_purchasable_id_falls_back_to_product() {
        let item: CartItem =
            serde_json::from_str(r#"{"productId": 10, "quantity": 1, "color": " "}"#).unwrap();
        assert_eq!(item.purchasable_id(), 10);
        assert!(item.variation_attributes().is_empty());
    }
}
