//! Checkout cart model.
//!
//! A completed cart is the input to order-set splitting. Every line item is
//! stamped with the seller that listed the product when it was added to the
//! cart; shipping methods may belong to a seller or to the platform.

use common::{
    CartId, CollectionId, CurrencyCode, CustomerId, LineItemId, Money, PaymentCollectionId,
    ProductId, ProductTypeId, SalesChannelId, SellerId, ShippingMethodId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A tax applied to a line item or shipping method, as a percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub code: String,
    /// Percentage, e.g. `20` for 20 %.
    pub rate: Decimal,
}

impl TaxLine {
    pub fn new(code: impl Into<String>, rate: Decimal) -> Self {
        Self {
            code: code.into(),
            rate,
        }
    }
}

fn tax_on(amount: Decimal, tax_lines: &[TaxLine]) -> Decimal {
    tax_lines
        .iter()
        .map(|t| amount * t.rate / Decimal::ONE_HUNDRED)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Address {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub address_1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
}

/// A purchasable line of a cart, copied as-is into the seller's order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub seller_id: Option<SellerId>,
    pub product_id: ProductId,
    pub product_type_id: Option<ProductTypeId>,
    pub collection_id: Option<CollectionId>,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
}

impl LineItem {
    /// Creates a line item for a seller's product with no tax.
    pub fn new(
        seller_id: SellerId,
        product_id: impl Into<ProductId>,
        title: impl Into<String>,
        quantity: u32,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: LineItemId::new(),
            seller_id: Some(seller_id),
            product_id: product_id.into(),
            product_type_id: None,
            collection_id: None,
            title: title.into(),
            quantity,
            unit_price,
            tax_lines: Vec::new(),
        }
    }

    pub fn with_tax(mut self, tax: TaxLine) -> Self {
        self.tax_lines.push(tax);
        self
    }

    pub fn with_product_type(mut self, product_type_id: impl Into<ProductTypeId>) -> Self {
        self.product_type_id = Some(product_type_id.into());
        self
    }

    pub fn with_collection(mut self, collection_id: impl Into<CollectionId>) -> Self {
        self.collection_id = Some(collection_id.into());
        self
    }

    pub fn subtotal(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    pub fn tax_total(&self) -> Decimal {
        tax_on(self.subtotal(), &self.tax_lines)
    }

    pub fn total(&self) -> Decimal {
        self.subtotal() + self.tax_total()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    /// Seller shipping the goods; `None` for platform-level shipping.
    pub seller_id: Option<SellerId>,
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub tax_lines: Vec<TaxLine>,
}

impl ShippingMethod {
    pub fn new(seller_id: Option<SellerId>, name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: ShippingMethodId::new(),
            seller_id,
            name: name.into(),
            amount,
            tax_lines: Vec::new(),
        }
    }

    pub fn tax_total(&self) -> Decimal {
        tax_on(self.amount, &self.tax_lines)
    }

    pub fn total(&self) -> Decimal {
        self.amount + self.tax_total()
    }
}

/// A completed checkout cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub customer_id: Option<CustomerId>,
    pub sales_channel_id: SalesChannelId,
    pub payment_collection_id: PaymentCollectionId,
    pub currency: CurrencyCode,
    pub email: Option<String>,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub shipping_methods: Vec<ShippingMethod>,
}

impl Cart {
    /// Creates an empty cart in the given currency.
    pub fn new(currency: impl Into<CurrencyCode>) -> Self {
        Self {
            id: CartId::new(),
            customer_id: None,
            sales_channel_id: SalesChannelId::new(),
            payment_collection_id: PaymentCollectionId::new(),
            currency: currency.into(),
            email: None,
            shipping_address: None,
            billing_address: None,
            items: Vec::new(),
            shipping_methods: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_shipping(mut self, method: ShippingMethod) -> Self {
        self.shipping_methods.push(method);
        self
    }

    pub fn item_total(&self) -> Decimal {
        self.items.iter().map(LineItem::total).sum()
    }

    pub fn shipping_total(&self) -> Decimal {
        self.shipping_methods.iter().map(ShippingMethod::total).sum()
    }

    /// Grand total charged to the customer.
    pub fn total(&self) -> Decimal {
        self.item_total() + self.shipping_total()
    }

    pub fn total_money(&self) -> Money {
        Money::new(self.total(), self.currency.clone())
    }

    /// Sellers with at least one line item, in order of first appearance.
    pub fn sellers(&self) -> Vec<SellerId> {
        let mut sellers = Vec::new();
        for seller in self.items.iter().filter_map(|i| i.seller_id) {
            if !sellers.contains(&seller) {
                sellers.push(seller);
            }
        }
        sellers
    }
}
