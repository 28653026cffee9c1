use crate::{
    AppState,
    handlers::{cart, categories, menu_items, orders},
};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// The restaurant resources. The router layer above this module rejects any
/// request that does not resolve to an `AuthUser`; role decisions happen in
/// the handlers through the policy module.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Catalog ---
        // Reads are open to every authenticated user, writes to managers.
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/{id}",
            get(categories::get_category)
                .put(categories::update_category)
                .patch(categories::partial_update_category)
                .delete(categories::delete_category),
        )
        // GET /menu-items?category=&featured=&price=&search=&ordering=&page=&page_size=
        .route(
            "/menu-items",
            get(menu_items::list_menu_items).post(menu_items::create_menu_item),
        )
        .route(
            "/menu-items/{id}",
            get(menu_items::get_menu_item)
                .put(menu_items::update_menu_item)
                .patch(menu_items::partial_update_menu_item)
                .delete(menu_items::delete_menu_item),
        )
        // --- Cart ---
        // Always narrowed to the caller's own lines.
        .route("/cart", get(cart::list_cart).post(cart::add_to_cart))
        .route(
            "/cart/{id}",
            get(cart::get_cart_line).delete(cart::remove_from_cart),
        )
        // --- Orders ---
        // POST /orders converts the caller's cart in one transaction.
        .route("/orders", get(orders::list_orders).post(orders::place_order))
        .route(
            "/orders/{id}",
            get(orders::get_order)
                .put(orders::update_order)
                .patch(orders::partial_update_order)
                .delete(orders::delete_order),
        )
}
