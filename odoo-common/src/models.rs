//! # Typed Models
//!
//! Fixed-shape views over a subset of the fields of three standard models.
//! Each type carries its schema; add fields by extending both the struct and
//! its `SCHEMA` table.

use serde::Serialize;

use crate::mapper::{DecodedRow, FieldSpec, FieldValue, Record};

/// Contact or company (`res.partner`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResPartner {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub is_company: bool,
}

impl Record for ResPartner {
    const MODEL: &'static str = "res.partner";
    const SCHEMA: &'static [FieldSpec] = &[
        FieldSpec::integer("id"),
        FieldSpec::text("name"),
        FieldSpec::text("email"),
        FieldSpec::boolean("is_company"),
    ];

    fn from_row(mut row: DecodedRow) -> Self {
        ResPartner {
            id: row.integer("id"),
            name: row.text("name"),
            email: row.text("email"),
            is_company: row.boolean("is_company"),
        }
    }

    fn to_row(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Integer(self.id),
            FieldValue::Text(self.name.clone()),
            FieldValue::Text(self.email.clone()),
            FieldValue::Boolean(self.is_company),
        ]
    }
}

/// Product variant (`product.product`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductProduct {
    pub id: i64,
    pub name: String,
    /// Product type (`consu`, `service`, `product`).
    pub product_type: String,
    pub sale_ok: bool,
    pub purchase_ok: bool,
    pub list_price: f64,
    pub standard_price: f64,
}

impl Record for ProductProduct {
    const MODEL: &'static str = "product.product";
    const SCHEMA: &'static [FieldSpec] = &[
        FieldSpec::integer("id"),
        FieldSpec::text("name"),
        FieldSpec::text("type"),
        FieldSpec::boolean("sale_ok"),
        FieldSpec::boolean("purchase_ok"),
        FieldSpec::float("list_price"),
        FieldSpec::float("standard_price"),
    ];

    fn from_row(mut row: DecodedRow) -> Self {
        ProductProduct {
            id: row.integer("id"),
            name: row.text("name"),
            product_type: row.text("type"),
            sale_ok: row.boolean("sale_ok"),
            purchase_ok: row.boolean("purchase_ok"),
            list_price: row.float("list_price"),
            standard_price: row.float("standard_price"),
        }
    }

    fn to_row(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Integer(self.id),
            FieldValue::Text(self.name.clone()),
            FieldValue::Text(self.product_type.clone()),
            FieldValue::Boolean(self.sale_ok),
            FieldValue::Boolean(self.purchase_ok),
            FieldValue::Float(self.list_price),
            FieldValue::Float(self.standard_price),
        ]
    }
}

/// Journal entry or invoice (`account.move`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccountMove {
    pub id: i64,
    pub name: String,
    /// Id half of the `[id, name]` relation; 0 when unset.
    pub partner_id: i64,
    /// `YYYY-MM-DD`, empty when unset.
    pub invoice_date: String,
    pub amount_total: f64,
    pub state: String,
}

impl Record for AccountMove {
    const MODEL: &'static str = "account.move";
    const SCHEMA: &'static [FieldSpec] = &[
        FieldSpec::integer("id"),
        FieldSpec::text("name"),
        FieldSpec::integer("partner_id"),
        FieldSpec::text("invoice_date"),
        FieldSpec::float("amount_total"),
        FieldSpec::text("state"),
    ];

    fn from_row(mut row: DecodedRow) -> Self {
        AccountMove {
            id: row.integer("id"),
            name: row.text("name"),
            partner_id: row.integer("partner_id"),
            invoice_date: row.text("invoice_date"),
            amount_total: row.float("amount_total"),
            state: row.text("state"),
        }
    }

    fn to_row(&self) -> Vec<FieldValue> {
        vec![
            FieldValue::Integer(self.id),
            FieldValue::Text(self.name.clone()),
            FieldValue::Integer(self.partner_id),
            FieldValue::Text(self.invoice_date.clone()),
            FieldValue::Float(self.amount_total),
            FieldValue::Text(self.state.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{describe, field_names, map_record};
    use crate::types::Value;
    use serde_json::json;

    fn remote(value: serde_json::Value) -> crate::types::RemoteRecord {
        Value::from(value).into_struct().unwrap()
    }

    #[test]
    fn test_partner_from_string_fields() {
        let partner: ResPartner =
            map_record(&remote(json!({"id": "42", "name": "Acme", "is_company": "1"}))).unwrap();
        assert_eq!(
            partner,
            ResPartner {
                id: 42,
                name: "Acme".to_string(),
                email: String::new(),
                is_company: true,
            }
        );
    }

    #[test]
    fn test_product_projection_uses_remote_names() {
        assert_eq!(
            field_names::<ProductProduct>(),
            vec!["id", "name", "type", "sale_ok", "purchase_ok", "list_price", "standard_price"]
        );
        let product: ProductProduct = map_record(&remote(json!({
            "id": 3, "name": "Desk", "type": "consu", "sale_ok": true,
            "purchase_ok": false, "list_price": 120, "standard_price": "80.5"
        })))
        .unwrap();
        assert_eq!(product.product_type, "consu");
        assert_eq!(product.list_price, 120.0);
        assert_eq!(product.standard_price, 80.5);
    }

    #[test]
    fn test_move_partner_relation_and_empty_date() {
        let invoice: AccountMove = map_record(&remote(json!({
            "id": 9, "name": "INV/2024/0001", "partner_id": [14, "Azure Interior"],
            "invoice_date": false, "amount_total": 1500.0, "state": "posted"
        })))
        .unwrap();
        assert_eq!(invoice.partner_id, 14);
        assert_eq!(invoice.invoice_date, "");
        assert_eq!(invoice.state, "posted");
    }

    #[test]
    fn test_describe_lists_schema_fields() {
        let partner = ResPartner {
            id: 1,
            name: "Acme".to_string(),
            email: "info@acme.test".to_string(),
            is_company: true,
        };
        assert_eq!(
            describe(&partner),
            "-----\nid: 1\nname: Acme\nemail: info@acme.test\nis_company: true\n-----"
        );
    }
}
