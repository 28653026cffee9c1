use little_lemon::{
    AppError,
    extract::rejection_errors,
    models::{
        CartLine, CategoryRequest, CreateCartLineRequest, MAX_ORDER_TOTAL, MAX_PRICE,
        MAX_QUANTITY, MenuItem, MenuItemPatch, MenuItemRequest, OrderStatus, Role,
        UpdateOrderRequest, order_total, slugify,
    },
    repository::{MenuOrdering, MenuSortField},
};
use rust_decimal::Decimal;
use uuid::Uuid;

// --- Serialization ---

#[test]
fn test_menu_item_json_round_trip() {
    let item = MenuItem {
        id: 7,
        title: "Greek Salad".to_string(),
        price: "12.50".parse().unwrap(),
        featured: true,
        category: 3,
        category_title: Some("Starters".to_string()),
    };

    let json_output = serde_json::to_string(&item).unwrap();
    // Prices travel as strings so no precision is lost.
    assert!(json_output.contains(r#""price":"12.50""#));

    let parsed: MenuItem = serde_json::from_str(&json_output).unwrap();
    assert_eq!(parsed, item);
}

#[test]
fn test_menu_item_category_title_is_optional_on_input() {
    let parsed: MenuItem = serde_json::from_str(
        r#"{"id":1,"title":"Soup","price":"4.00","featured":false,"category":2}"#,
    )
    .unwrap();
    assert_eq!(parsed.category_title, None);
    assert!(!serde_json::to_string(&parsed).unwrap().contains("category_title"));
}

#[test]
fn test_role_wire_names() {
    assert_eq!(
        serde_json::to_string(&Role::DeliveryCrew).unwrap(),
        r#""Delivery Crew""#
    );
    let parsed: Role = serde_json::from_str(r#""Manager""#).unwrap();
    assert_eq!(parsed, Role::Manager);
    assert_eq!("Delivery Crew".parse::<Role>().unwrap(), Role::DeliveryCrew);
    assert!("Admin".parse::<Role>().is_err());
}

#[test]
fn test_order_status_wire_names() {
    assert_eq!(
        serde_json::to_string(&OrderStatus::OutForDelivery).unwrap(),
        r#""out_for_delivery""#
    );
    assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    assert_eq!("delivered".parse::<OrderStatus>().unwrap(), OrderStatus::Delivered);
}

#[test]
fn test_update_order_request_distinguishes_null_from_absent() {
    let absent: UpdateOrderRequest = serde_json::from_str(r#"{"status":"assigned"}"#).unwrap();
    assert_eq!(absent.status, Some(OrderStatus::Assigned));
    assert_eq!(absent.delivery_crew, None);

    let cleared: UpdateOrderRequest = serde_json::from_str(r#"{"delivery_crew":null}"#).unwrap();
    assert_eq!(cleared.delivery_crew, Some(None));
    assert!(!cleared.is_empty());

    let crew = Uuid::new_v4();
    let set: UpdateOrderRequest =
        serde_json::from_str(&format!(r#"{{"delivery_crew":"{crew}"}}"#)).unwrap();
    assert_eq!(set.delivery_crew, Some(Some(crew)));

    let empty: UpdateOrderRequest = serde_json::from_str("{}").unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_menu_item_patch_omits_unset_fields() {
    let patch = MenuItemPatch {
        featured: Some(true),
        ..Default::default()
    };
    let json_output = serde_json::to_string(&patch).unwrap();
    assert_eq!(json_output, r#"{"featured":true}"#);
}

// --- Validation ---

#[test]
fn test_menu_item_request_validation() {
    let ok = MenuItemRequest {
        title: "Pasta".to_string(),
        price: "9.99".parse().unwrap(),
        featured: false,
        category: 1,
    };
    assert!(ok.validate().is_ok());

    let bad = MenuItemRequest {
        title: "   ".to_string(),
        price: Decimal::NEGATIVE_ONE,
        ..ok
    };
    match bad.validate() {
        Err(AppError::Validation(errors)) => {
            assert!(errors.contains("title"));
            assert!(errors.contains("price"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

fn price_errors(price: &str) -> Option<Vec<String>> {
    let request = MenuItemRequest {
        title: "Pasta".to_string(),
        price: price.parse().unwrap(),
        featured: false,
        category: 1,
    };
    match request.validate() {
        Ok(()) => None,
        Err(AppError::Validation(errors)) => {
            let json = serde_json::to_value(&errors).unwrap();
            Some(serde_json::from_value(json["price"].clone()).unwrap())
        }
        Err(other) => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_price_bounds_and_scale() {
    assert_eq!(MAX_PRICE.to_string(), "9999.99");
    assert!(price_errors("0.01").is_none());
    assert!(price_errors("9999.99").is_none());
    assert!(price_errors("5.5").is_none());

    assert!(price_errors("0").is_some());
    assert!(price_errors("10000").is_some());
    assert!(price_errors("79228162514264337593543950").is_some());

    let too_precise = price_errors("5.005").unwrap();
    assert_eq!(too_precise.len(), 1);
    assert!(too_precise[0].contains("2 decimal places"));

    let patch = MenuItemPatch {
        price: Some("12345.678".parse().unwrap()),
        ..Default::default()
    };
    assert!(patch.validate().is_err());
}

#[test]
fn test_cart_quantity_bounds() {
    let line = |quantity| CreateCartLineRequest {
        menu_item: 1,
        quantity,
        user: None,
    };
    assert!(line(1).validate().is_ok());
    assert!(line(MAX_QUANTITY).validate().is_ok());
    assert!(line(0).validate().is_err());
    assert!(line(MAX_QUANTITY + 1).validate().is_err());
}

#[test]
fn test_order_total_is_checked() {
    let line = |quantity, unit_price: Decimal| CartLine {
        quantity,
        unit_price,
        ..Default::default()
    };

    let lines = [line(2, "5.00".parse().unwrap()), line(1, "3.00".parse().unwrap())];
    assert_eq!(order_total(&lines), Some("13.00".parse().unwrap()));
    assert_eq!(order_total(&[]), Some(Decimal::ZERO));

    assert_eq!(order_total(&[line(5000, Decimal::MAX)]), None);
    assert_eq!(order_total(&[line(1, Decimal::MAX), line(1, Decimal::MAX)]), None);
    assert_eq!(MAX_ORDER_TOTAL.to_string(), "999999999999.99");
    assert_eq!(
        order_total(&[line(1, MAX_ORDER_TOTAL), line(1, "0.01".parse().unwrap())]),
        None
    );
}

#[test]
fn test_rejection_text_is_keyed_by_field() {
    let missing = rejection_errors(
        "Failed to deserialize the JSON body into the target type: missing field `category` at line 1 column 30",
    );
    assert!(missing.contains("category"));

    let bad_variant = rejection_errors(
        "Failed to deserialize the JSON body into the target type: status: unknown variant `lost`, expected one of `pending`, `assigned` at line 1 column 16",
    );
    assert!(bad_variant.contains("status"));

    let query = rejection_errors("Failed to deserialize query string: page: invalid digit found in string");
    assert!(query.contains("page"));

    let syntax = rejection_errors("Failed to parse the request body as JSON: expected value at line 1 column 1");
    assert!(syntax.contains("non_field_errors"));

    let content_type = rejection_errors("Expected request with `Content-Type: application/json`");
    assert!(content_type.contains("non_field_errors"));
}

#[test]
fn test_category_slug_is_derived_when_missing() {
    let request = CategoryRequest {
        title: "Main Courses & Sides".to_string(),
        slug: None,
    };
    assert_eq!(request.resolved_slug(), "main-courses-sides");

    let explicit = CategoryRequest {
        title: "Drinks".to_string(),
        slug: Some("beverages".to_string()),
    };
    assert_eq!(explicit.resolved_slug(), "beverages");
}

#[test]
fn test_slugify_edges() {
    assert_eq!(slugify("  Lemon -- Desserts!  "), "lemon-desserts");
    assert_eq!(slugify("!!!"), "");
    assert_eq!(slugify("Already-slugged"), "already-slugged");
}

#[test]
fn test_menu_ordering_parse() {
    let parsed = MenuOrdering::parse_list("-price, title,unknown,");
    assert_eq!(
        parsed,
        vec![
            MenuOrdering {
                field: MenuSortField::Price,
                descending: true
            },
            MenuOrdering {
                field: MenuSortField::Title,
                descending: false
            },
        ]
    );
    assert!(MenuOrdering::parse_list("").is_empty());
}
