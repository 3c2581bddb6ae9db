//! Binding models and local models of the Shopware backend.

use storelink_core::BindingModel;

/// Backend type the units are registered for.
pub const BACKEND_TYPE: &str = "shopware";

/// Shop (standalone).
pub const SHOP: &str = "shopware.shop";
/// Customer group, wraps `res.partner.category`.
pub const PARTNER_CATEGORY: &str = "shopware.res.partner.category";
/// Customer, wraps `res.partner`.
pub const PARTNER: &str = "shopware.res.partner";
/// Customer address, wraps `res.partner`.
pub const ADDRESS: &str = "shopware.address";
/// Product category, wraps `product.category`.
pub const PRODUCT_CATEGORY: &str = "shopware.product.category";
/// Article (standalone), the parent of variants.
pub const ARTICLE: &str = "shopware.article";
/// Variant, wraps `product.product`.
pub const PRODUCT: &str = "shopware.product.product";
/// Sale order, wraps `sale.order`.
pub const SALE_ORDER: &str = "shopware.sale.order";
/// Invoice, wraps `account.invoice`.
pub const INVOICE: &str = "shopware.account.invoice";
/// Delivery order, wraps `stock.picking`.
pub const PICKING: &str = "shopware.stock.picking";

/// Local models.
pub mod local {
    /// Customer categories.
    pub const PARTNER_CATEGORY: &str = "res.partner.category";
    /// Partners and their contacts.
    pub const PARTNER: &str = "res.partner";
    /// Countries, searched by `code`.
    pub const COUNTRY: &str = "res.country";
    /// Product categories.
    pub const PRODUCT_CATEGORY: &str = "product.category";
    /// Products.
    pub const PRODUCT: &str = "product.product";
    /// Sale orders.
    pub const SALE_ORDER: &str = "sale.order";
    /// Invoices.
    pub const INVOICE: &str = "account.invoice";
    /// Delivery orders.
    pub const PICKING: &str = "stock.picking";
    /// Carriers.
    pub const CARRIER: &str = "delivery.carrier";
}

/// Product binding fields whose change exports the inventory.
pub const INVENTORY_FIELDS: [&str; 3] = ["manage_stock", "backorders", "shopware_qty"];

/// Returns every binding model of the backend.
pub fn binding_models() -> Vec<BindingModel> {
    vec![
        BindingModel::standalone(SHOP),
        BindingModel::wrapping(PARTNER_CATEGORY, local::PARTNER_CATEGORY),
        BindingModel::wrapping(PARTNER, local::PARTNER).with_binding_fields(&[
            "shopware_group_id",
            "shop_id",
            "created_at",
            "updated_at",
            "consider_as_company",
        ]),
        BindingModel::wrapping(ADDRESS, local::PARTNER).with_binding_fields(&[
            "shopware_partner_id",
            "is_default_billing",
            "is_default_shipping",
            "updated_at",
        ]),
        BindingModel::wrapping(PRODUCT_CATEGORY, local::PRODUCT_CATEGORY)
            .with_binding_fields(&["shopware_parent_id", "changed"]),
        BindingModel::standalone(ARTICLE),
        BindingModel::wrapping(PRODUCT, local::PRODUCT).with_binding_fields(&[
            "shopware_article_id",
            "changed",
            "manage_stock",
            "backorders",
            "shopware_qty",
            "no_stock_sync",
        ]),
        BindingModel::wrapping(SALE_ORDER, local::SALE_ORDER).with_binding_fields(&[
            "shop_id",
            "shopware_order_id",
            "order_lines",
        ]),
        BindingModel::wrapping(INVOICE, local::INVOICE)
            .with_binding_fields(&["shopware_order_id"])
            .one_per_record(),
        BindingModel::wrapping(PICKING, local::PICKING).with_binding_fields(&["shopware_order_id"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_models_are_unique() {
        let models = binding_models();
        let mut names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), models.len());
    }

    #[test]
    fn inventory_fields_live_on_the_binding() {
        let product = binding_models()
            .into_iter()
            .find(|m| m.name == PRODUCT)
            .unwrap();
        for field in INVENTORY_FIELDS {
            assert!(product.is_binding_field(field));
        }
        assert!(!product.is_binding_field("default_code"));
    }
}
