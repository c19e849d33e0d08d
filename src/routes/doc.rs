use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    checkout::ChargeReceipt,
    dto::{
        auth::{
            AuthResponse, MessageResponse, RequestResetRequest, ResetPasswordRequest,
            SigninRequest, SignupRequest,
        },
        bag::{AddToBagRequest, BagEntryDto, BagList},
        items::{CreateItemRequest, ItemList, UpdateItemRequest},
        orders::{CheckoutRequest, OrderList, OrderWithItems},
        users::UpdatePermissionsRequest,
    },
    error::ErrorData,
    middleware::auth::Permission,
    models::{BagEntry, Item, Order, OrderItem, User},
    response::{ApiResponse, Meta},
    routes::{auth, bag, health, items, orders, params, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::signup,
        auth::signin,
        auth::signout,
        auth::request_reset,
        auth::reset_password,
        items::list_items,
        items::get_item,
        items::create_item,
        items::update_item,
        items::delete_item,
        bag::bag_list,
        bag::add_to_bag,
        bag::remove_from_bag,
        orders::list_order,
        orders::checkout,
        orders::get_order,
        users::update_permissions
    ),
    components(
        schemas(
            User,
            Item,
            BagEntry,
            Order,
            OrderItem,
            Permission,
            ChargeReceipt,
            SignupRequest,
            SigninRequest,
            AuthResponse,
            RequestResetRequest,
            ResetPasswordRequest,
            MessageResponse,
            CreateItemRequest,
            UpdateItemRequest,
            ItemList,
            AddToBagRequest,
            BagEntryDto,
            BagList,
            CheckoutRequest,
            OrderList,
            OrderWithItems,
            UpdatePermissionsRequest,
            ErrorData,
            params::Pagination,
            params::SortOrder,
            params::OrderListQuery,
            Meta,
            ApiResponse<Item>,
            ApiResponse<ItemList>,
            ApiResponse<BagList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<ErrorData>
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Sign up, sign in and password reset"),
        (name = "Items", description = "Catalog items"),
        (name = "Bag", description = "Per-user shopping bag"),
        (name = "Orders", description = "Checkout and order history"),
        (name = "Users", description = "Permission management"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
