use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use little_lemon::{
    AppError, AppState, InMemoryRepository,
    auth::AuthUser,
    config::AppConfig,
    extract::{ValidJson, ValidQuery},
    handlers::{
        cart, categories,
        menu_items::{self, MenuItemFilter},
        orders, users,
    },
    models::{
        CategoryRequest, CreateCartLineRequest, MenuItem, MenuItemPatch, MenuItemRequest,
        OrderStatus, Role, UpdateOrderRequest,
    },
    policy::OrderScope,
    repository::{NewCartLine, Repository, RepositoryState},
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Fixture ---

// Handlers are called directly against the in-memory store. `repo` is the
// concrete handle for seeding and assertions; `state` is what handlers see.
struct Fixture {
    repo: Arc<InMemoryRepository>,
    state: AppState,
    manager: AuthUser,
    crew: AuthUser,
    alice: AuthUser,
    bob: AuthUser,
}

impl Fixture {
    async fn new() -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            config: AppConfig::default(),
        };

        let manager = seed_user(&repo, "manager@lemon.test", &[Role::Manager]).await;
        let crew = seed_user(&repo, "crew@lemon.test", &[Role::DeliveryCrew]).await;
        let alice = seed_user(&repo, "alice@lemon.test", &[Role::Customer]).await;
        let bob = seed_user(&repo, "bob@lemon.test", &[Role::Customer]).await;

        Self {
            repo,
            state,
            manager,
            crew,
            alice,
            bob,
        }
    }

    async fn menu_item(&self, title: &str, price: &str, category: i64) -> MenuItem {
        self.repo
            .create_menu_item(&MenuItemRequest {
                title: title.to_string(),
                price: dec(price),
                featured: false,
                category,
            })
            .await
            .unwrap()
    }

    async fn category(&self, title: &str) -> i64 {
        self.repo
            .create_category(title, &title.to_lowercase())
            .await
            .unwrap()
            .id
    }

    async fn add_to_cart(&self, user: &AuthUser, menu_item: i64, quantity: i32) {
        cart::add_to_cart(
            user.clone(),
            State(self.state.clone()),
            ValidJson(CreateCartLineRequest {
                menu_item,
                quantity,
                user: None,
            }),
        )
        .await
        .unwrap();
    }

    async fn place_order_for(&self, user: &AuthUser) -> i64 {
        let category = self.category(&format!("Set menu {}", user.id)).await;
        let item = self.menu_item("Daily special", "10.00", category).await;
        self.add_to_cart(user, item.id, 1).await;
        let (_, Json(order)) = orders::place_order(user.clone(), State(self.state.clone()))
            .await
            .unwrap();
        order.id
    }
}

async fn seed_user(repo: &InMemoryRepository, email: &str, roles: &[Role]) -> AuthUser {
    let user = repo.insert_user(Uuid::new_v4(), email, roles).await;
    AuthUser::new(user.id, user.roles)
}

fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

fn assert_field_error<T: std::fmt::Debug>(result: Result<T, AppError>, field: &str) {
    match result {
        Err(AppError::Validation(errors)) => {
            assert!(errors.contains(field), "expected error on {field}, got {errors:?}")
        }
        other => panic!("expected validation error on {field}, got {other:?}"),
    }
}

// --- Categories ---

#[test]
async fn test_manager_creates_category_with_derived_slug() {
    let f = Fixture::new().await;

    let (status, Json(category)) = categories::create_category(
        f.manager.clone(),
        State(f.state.clone()),
        ValidJson(CategoryRequest {
            title: "Main Courses".to_string(),
            slug: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(category.slug, "main-courses");
}

#[test]
async fn test_duplicate_category_title_is_validation_error() {
    let f = Fixture::new().await;
    f.category("Desserts").await;

    let result = categories::create_category(
        f.manager.clone(),
        State(f.state.clone()),
        ValidJson(CategoryRequest {
            title: "Desserts".to_string(),
            slug: Some("desserts-2".to_string()),
        }),
    )
    .await;

    assert_field_error(result, "title");
}

#[test]
async fn test_non_manager_category_writes_are_forbidden_and_change_nothing() {
    let f = Fixture::new().await;
    let id = f.category("Drinks").await;

    let create = categories::create_category(
        f.alice.clone(),
        State(f.state.clone()),
        ValidJson(CategoryRequest {
            title: "Sneaky".to_string(),
            slug: None,
        }),
    )
    .await;
    assert!(matches!(create, Err(AppError::Forbidden(_))));

    let delete = categories::delete_category(f.crew.clone(), State(f.state.clone()), Path(id)).await;
    assert!(matches!(delete, Err(AppError::Forbidden(_))));

    let all = f.repo.list_categories().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "Drinks");
}

#[test]
async fn test_category_in_use_cannot_be_deleted() {
    let f = Fixture::new().await;
    let id = f.category("Starters").await;
    f.menu_item("Bruschetta", "7.50", id).await;

    let result = categories::delete_category(f.manager.clone(), State(f.state.clone()), Path(id)).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
    assert!(f.repo.get_category(id).await.unwrap().is_some());
}

// --- Menu items ---

#[test]
async fn test_non_manager_menu_item_create_is_forbidden() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;

    for caller in [&f.alice, &f.crew] {
        let result = menu_items::create_menu_item(
            caller.clone(),
            State(f.state.clone()),
            ValidJson(MenuItemRequest {
                title: "Pasta".to_string(),
                price: dec("12.00"),
                featured: false,
                category,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    let (items, count) = f.repo.list_menu_items(&Default::default()).await.unwrap();
    assert!(items.is_empty());
    assert_eq!(count, 0);
}

#[test]
async fn test_non_manager_menu_item_update_leaves_record_unchanged() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let item = f.menu_item("Pasta", "12.00", category).await;

    let result = menu_items::partial_update_menu_item(
        f.bob.clone(),
        State(f.state.clone()),
        Path(item.id),
        ValidJson(MenuItemPatch {
            price: Some(dec("0.50")),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let stored = f.repo.get_menu_item(item.id).await.unwrap().unwrap();
    assert_eq!(stored.price, dec("12.00"));
}

#[test]
async fn test_menu_item_validation() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;

    let bad_price = menu_items::create_menu_item(
        f.manager.clone(),
        State(f.state.clone()),
        ValidJson(MenuItemRequest {
            title: "Free lunch".to_string(),
            price: Decimal::ZERO,
            featured: false,
            category,
        }),
    )
    .await;
    assert_field_error(bad_price, "price");

    let bad_category = menu_items::create_menu_item(
        f.manager.clone(),
        State(f.state.clone()),
        ValidJson(MenuItemRequest {
            title: "Orphan".to_string(),
            price: dec("4.00"),
            featured: false,
            category: 9999,
        }),
    )
    .await;
    assert_field_error(bad_category, "category");
}

#[test]
async fn test_menu_item_pagination_envelope() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    for (title, price) in [("A", "1.00"), ("B", "2.00"), ("C", "3.00")] {
        f.menu_item(title, price, category).await;
    }

    let Json(first) = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter::default()),
    )
    .await
    .unwrap();
    assert_eq!(first.count, 3);
    assert_eq!(first.page_size, 2);
    assert_eq!(first.results.len(), 2);
    assert_eq!(first.next, Some(2));
    assert_eq!(first.previous, None);

    let Json(second) = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter {
            page: Some(2),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(second.results.len(), 1);
    assert_eq!(second.results[0].title, "C");
    assert_eq!(second.next, None);
    assert_eq!(second.previous, Some(1));

    let beyond = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter {
            page: Some(3),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(beyond, Err(AppError::NotFound(_))));

    let zero = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter {
            page: Some(0),
            ..Default::default()
        }),
    )
    .await;
    assert_field_error(zero, "page");
}

#[test]
async fn test_menu_item_page_size_is_clamped() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    for title in ["A", "B", "C"] {
        f.menu_item(title, "1.00", category).await;
    }

    let mut state = f.state.clone();
    state.config.menu_max_page_size = 2;

    let Json(page) = menu_items::list_menu_items(
        f.alice.clone(),
        State(state),
        ValidQuery(MenuItemFilter {
            page_size: Some(500),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(page.page_size, 2);
    assert_eq!(page.results.len(), 2);
}

#[test]
async fn test_menu_item_search_filter_and_ordering() {
    let f = Fixture::new().await;
    let mains = f.category("Mains").await;
    let desserts = f.category("Desserts").await;
    f.menu_item("Lemon Chicken", "15.00", mains).await;
    f.menu_item("Greek Salad", "9.00", mains).await;
    f.menu_item("Lemon Cake", "6.00", desserts).await;

    let Json(lemons) = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter {
            search: Some("LEMON".to_string()),
            ordering: Some("-price".to_string()),
            page_size: Some(10),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    let titles: Vec<_> = lemons.results.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, ["Lemon Chicken", "Lemon Cake"]);

    // Search also matches the category title.
    let Json(by_category) = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter {
            search: Some("dessert".to_string()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(by_category.count, 1);
    assert_eq!(by_category.results[0].category_title.as_deref(), Some("Desserts"));

    let Json(mains_only) = menu_items::list_menu_items(
        f.alice.clone(),
        State(f.state.clone()),
        ValidQuery(MenuItemFilter {
            category: Some(mains),
            ordering: Some("title,bogus".to_string()),
            page_size: Some(10),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    let titles: Vec<_> = mains_only.results.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(titles, ["Greek Salad", "Lemon Chicken"]);
}

#[test]
async fn test_menu_item_delete_cascades_to_carts_and_keeps_order_snapshot() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let item = f.menu_item("Pasta", "12.00", category).await;

    f.add_to_cart(&f.alice, item.id, 1).await;
    let (_, Json(order)) = orders::place_order(f.alice.clone(), State(f.state.clone()))
        .await
        .unwrap();
    f.add_to_cart(&f.bob, item.id, 2).await;

    let status = menu_items::delete_menu_item(f.manager.clone(), State(f.state.clone()), Path(item.id))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(f.repo.all_cart_lines().await.is_empty());
    let Json(kept) = orders::get_order(f.manager.clone(), State(f.state.clone()), Path(order.id))
        .await
        .unwrap();
    assert_eq!(kept.items[0].menu_item, None);
    assert_eq!(kept.items[0].unit_price, dec("12.00"));
}

// --- Cart ---

#[test]
async fn test_cart_isolation_between_customers() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let item = f.menu_item("Pasta", "12.00", category).await;

    f.add_to_cart(&f.alice, item.id, 2).await;

    let Json(bobs) = cart::list_cart(f.bob.clone(), State(f.state.clone())).await.unwrap();
    assert!(bobs.is_empty());

    let Json(alices) = cart::list_cart(f.alice.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(alices.len(), 1);
    let line_id = alices[0].id;

    let peek = cart::get_cart_line(f.bob.clone(), State(f.state.clone()), Path(line_id)).await;
    assert!(matches!(peek, Err(AppError::NotFound(_))));

    let steal = cart::remove_from_cart(f.bob.clone(), State(f.state.clone()), Path(line_id)).await;
    assert!(matches!(steal, Err(AppError::NotFound(_))));
    assert_eq!(f.repo.all_cart_lines().await.len(), 1);

    let removed = cart::remove_from_cart(f.alice.clone(), State(f.state.clone()), Path(line_id))
        .await
        .unwrap();
    assert_eq!(removed, StatusCode::NO_CONTENT);
}

#[test]
async fn test_cart_line_owner_is_forced_to_caller() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let item = f.menu_item("Pasta", "12.00", category).await;

    let (status, Json(line)) = cart::add_to_cart(
        f.alice.clone(),
        State(f.state.clone()),
        ValidJson(CreateCartLineRequest {
            menu_item: item.id,
            quantity: 3,
            user: Some(f.bob.id),
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(line.user, f.alice.id);
    assert_eq!(line.unit_price, dec("12.00"));
}

#[test]
async fn test_non_customer_cannot_add_to_cart() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let item = f.menu_item("Pasta", "12.00", category).await;

    for caller in [&f.manager, &f.crew] {
        let result = cart::add_to_cart(
            caller.clone(),
            State(f.state.clone()),
            ValidJson(CreateCartLineRequest {
                menu_item: item.id,
                quantity: 1,
                user: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
    assert!(f.repo.all_cart_lines().await.is_empty());
}

#[test]
async fn test_cart_validation() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let item = f.menu_item("Pasta", "12.00", category).await;

    let missing = cart::add_to_cart(
        f.alice.clone(),
        State(f.state.clone()),
        ValidJson(CreateCartLineRequest {
            menu_item: 424242,
            quantity: 1,
            user: None,
        }),
    )
    .await;
    assert_field_error(missing, "menu_item");

    let zero = cart::add_to_cart(
        f.alice.clone(),
        State(f.state.clone()),
        ValidJson(CreateCartLineRequest {
            menu_item: item.id,
            quantity: 0,
            user: None,
        }),
    )
    .await;
    assert_field_error(zero, "quantity");
}

// --- Orders ---

#[test]
async fn test_place_order_snapshots_cart_and_clears_it() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let a = f.menu_item("A", "5.00", category).await;
    let b = f.menu_item("B", "3.00", category).await;

    f.add_to_cart(&f.alice, a.id, 2).await;
    f.add_to_cart(&f.alice, b.id, 1).await;
    f.add_to_cart(&f.bob, a.id, 1).await;

    let (status, Json(order)) = orders::place_order(f.alice.clone(), State(f.state.clone()))
        .await
        .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order.user, f.alice.id);
    assert_eq!(order.total, dec("13.00"));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items.len(), 2);
    assert!(order.items.iter().all(|line| line.order == order.id));

    let Json(cart_after) = cart::list_cart(f.alice.clone(), State(f.state.clone())).await.unwrap();
    assert!(cart_after.is_empty());

    // Bob's cart is untouched.
    let Json(bobs) = cart::list_cart(f.bob.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(bobs.len(), 1);
}

#[test]
async fn test_empty_cart_order_is_rejected_every_time() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let a = f.menu_item("A", "5.00", category).await;

    let first = orders::place_order(f.alice.clone(), State(f.state.clone())).await;
    assert_field_error(first, "cart");

    f.add_to_cart(&f.alice, a.id, 1).await;
    orders::place_order(f.alice.clone(), State(f.state.clone()))
        .await
        .unwrap();

    // Second submit finds the cart already consumed.
    let second = orders::place_order(f.alice.clone(), State(f.state.clone())).await;
    assert_field_error(second, "cart");

    let Json(all) = orders::list_orders(f.manager.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_double_submit_places_one_order() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let a = f.menu_item("A", "5.00", category).await;
    f.add_to_cart(&f.alice, a.id, 2).await;

    let first = tokio::spawn(orders::place_order(f.alice.clone(), State(f.state.clone())));
    let second = tokio::spawn(orders::place_order(f.alice.clone(), State(f.state.clone())));
    let (first, second) = tokio::join!(first, second);
    let results = [first.unwrap(), second.unwrap()];

    let placed: Vec<_> = results.iter().filter(|result| result.is_ok()).collect();
    assert_eq!(placed.len(), 1);
    for result in results {
        if result.is_err() {
            assert_field_error(result, "cart");
        }
    }

    let Json(all) = orders::list_orders(f.manager.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].total, dec("10.00"));

    let Json(cart_after) = cart::list_cart(f.alice.clone(), State(f.state.clone())).await.unwrap();
    assert!(cart_after.is_empty());
}

#[test]
async fn test_order_total_overflow_is_rejected_and_cart_kept() {
    let f = Fixture::new().await;
    let category = f.category("Mains").await;
    let a = f.menu_item("A", "5.00", category).await;

    // Lines written straight to the store bypass request validation.
    f.repo
        .add_cart_line(NewCartLine {
            user: f.alice.id,
            menu_item: a.id,
            quantity: 5000,
            unit_price: Decimal::MAX,
        })
        .await
        .unwrap();

    let result = orders::place_order(f.alice.clone(), State(f.state.clone())).await;
    assert_field_error(result, "cart");

    let Json(all) = orders::list_orders(f.manager.clone(), State(f.state.clone())).await.unwrap();
    assert!(all.is_empty());
    let Json(cart_after) = cart::list_cart(f.alice.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(cart_after.len(), 1);
}

#[test]
async fn test_order_visibility_per_role() {
    let f = Fixture::new().await;
    let alice_order = f.place_order_for(&f.alice).await;
    let bob_order = f.place_order_for(&f.bob).await;

    let Json(all) = orders::list_orders(f.manager.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(all.len(), 2);

    let Json(mine) = orders::list_orders(f.alice.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, alice_order);

    let Json(assigned) = orders::list_orders(f.crew.clone(), State(f.state.clone())).await.unwrap();
    assert!(assigned.is_empty());

    let foreign = orders::get_order(f.alice.clone(), State(f.state.clone()), Path(bob_order)).await;
    assert!(matches!(foreign, Err(AppError::NotFound(_))));

    orders::partial_update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(bob_order),
        ValidJson(UpdateOrderRequest {
            delivery_crew: Some(Some(f.crew.id)),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    let Json(assigned) = orders::list_orders(f.crew.clone(), State(f.state.clone())).await.unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].id, bob_order);
}

#[test]
async fn test_delivery_crew_cannot_change_delivery_crew() {
    let f = Fixture::new().await;
    let order_id = f.place_order_for(&f.alice).await;
    let other_crew = seed_user(&f.repo, "crew2@lemon.test", &[Role::DeliveryCrew]).await;

    orders::partial_update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest {
            delivery_crew: Some(Some(f.crew.id)),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    let result = orders::partial_update_order(
        f.crew.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest {
            status: Some(OrderStatus::Delivered),
            delivery_crew: Some(Some(other_crew.id)),
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    // Nothing from the rejected request was written.
    let Json(order) = orders::get_order(f.manager.clone(), State(f.state.clone()), Path(order_id))
        .await
        .unwrap();
    assert_eq!(order.delivery_crew, Some(f.crew.id));
    assert_eq!(order.status, OrderStatus::Pending);
}

#[test]
async fn test_delivery_crew_advances_status_on_assigned_orders_only() {
    let f = Fixture::new().await;
    let assigned = f.place_order_for(&f.alice).await;
    let unassigned = f.place_order_for(&f.bob).await;

    orders::update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(assigned),
        ValidJson(UpdateOrderRequest {
            delivery_crew: Some(Some(f.crew.id)),
            ..Default::default()
        }),
    )
    .await
    .unwrap();

    let Json(order) = orders::partial_update_order(
        f.crew.clone(),
        State(f.state.clone()),
        Path(assigned),
        ValidJson(UpdateOrderRequest {
            status: Some(OrderStatus::OutForDelivery),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(order.status, OrderStatus::OutForDelivery);

    let other = orders::partial_update_order(
        f.crew.clone(),
        State(f.state.clone()),
        Path(unassigned),
        ValidJson(UpdateOrderRequest {
            status: Some(OrderStatus::Delivered),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(other, Err(AppError::NotFound(_))));
}

#[test]
async fn test_scoped_order_update_skips_reassigned_orders() {
    let f = Fixture::new().await;
    let order_id = f.place_order_for(&f.alice).await;
    let other_crew = seed_user(&f.repo, "crew2@lemon.test", &[Role::DeliveryCrew]).await;

    f.repo
        .update_order(
            order_id,
            OrderScope::All,
            &UpdateOrderRequest {
                delivery_crew: Some(Some(other_crew.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    // A crew member who read the order before the reassignment writes nothing.
    let stale = f
        .repo
        .update_order(
            order_id,
            OrderScope::AssignedTo(f.crew.id),
            &UpdateOrderRequest {
                status: Some(OrderStatus::Delivered),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(stale.is_none());

    let Json(order) = orders::get_order(f.manager.clone(), State(f.state.clone()), Path(order_id))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.delivery_crew, Some(other_crew.id));
}

#[test]
async fn test_manager_order_update_rules() {
    let f = Fixture::new().await;
    let order_id = f.place_order_for(&f.alice).await;

    let status_change = orders::partial_update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest {
            status: Some(OrderStatus::Delivered),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(status_change, Err(AppError::Forbidden(_))));

    let not_crew = orders::partial_update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest {
            delivery_crew: Some(Some(f.bob.id)),
            ..Default::default()
        }),
    )
    .await;
    assert_field_error(not_crew, "delivery_crew");

    let empty = orders::partial_update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest::default()),
    )
    .await;
    assert_field_error(empty, "non_field_errors");

    let Json(unassigned) = orders::partial_update_order(
        f.manager.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest {
            delivery_crew: Some(None),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(unassigned.delivery_crew, None);
}

#[test]
async fn test_customer_cannot_update_or_delete_orders() {
    let f = Fixture::new().await;
    let order_id = f.place_order_for(&f.alice).await;

    let update = orders::partial_update_order(
        f.alice.clone(),
        State(f.state.clone()),
        Path(order_id),
        ValidJson(UpdateOrderRequest {
            status: Some(OrderStatus::Delivered),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(update, Err(AppError::Forbidden(_))));

    let delete = orders::delete_order(f.alice.clone(), State(f.state.clone()), Path(order_id)).await;
    assert!(matches!(delete, Err(AppError::Forbidden(_))));

    let status = orders::delete_order(f.manager.clone(), State(f.state.clone()), Path(order_id))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let gone = orders::delete_order(f.manager.clone(), State(f.state.clone()), Path(order_id)).await;
    assert!(matches!(gone, Err(AppError::NotFound(_))));
}

// --- Role assignment ---

#[test]
async fn test_assign_delivery_crew_is_idempotent() {
    let f = Fixture::new().await;

    let (first, Json(user)) =
        users::assign_delivery_crew(f.manager.clone(), State(f.state.clone()), Path(f.bob.id))
            .await
            .unwrap();
    assert_eq!(first, StatusCode::CREATED);
    assert!(user.roles.contains(&Role::DeliveryCrew));
    assert!(user.roles.contains(&Role::Customer));

    let (second, Json(again)) =
        users::assign_delivery_crew(f.manager.clone(), State(f.state.clone()), Path(f.bob.id))
            .await
            .unwrap();
    assert_eq!(second, StatusCode::OK);
    assert_eq!(
        again.roles.iter().filter(|r| **r == Role::DeliveryCrew).count(),
        1
    );
}

#[test]
async fn test_assign_unknown_user_is_not_found() {
    let f = Fixture::new().await;
    let result =
        users::assign_delivery_crew(f.manager.clone(), State(f.state.clone()), Path(Uuid::new_v4()))
            .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[test]
async fn test_only_managers_assign_delivery_crew() {
    let f = Fixture::new().await;
    let result =
        users::assign_delivery_crew(f.alice.clone(), State(f.state.clone()), Path(f.bob.id)).await;
    assert!(matches!(result, Err(AppError::Forbidden(_))));

    let bob = f.repo.get_user(f.bob.id).await.unwrap().unwrap();
    assert!(!bob.roles.contains(&Role::DeliveryCrew));
}

#[test]
async fn test_manager_only_area() {
    let f = Fixture::new().await;

    let Json(message) = users::manager_only(f.manager.clone()).await.unwrap();
    assert_eq!(message.message, "Only Manager should see this.");

    let denied = users::manager_only(f.crew.clone()).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
}
