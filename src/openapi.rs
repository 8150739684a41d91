use crate::handlers;
use crate::models::{
    AssistantRequest, AssistantResponse, Listing, ListingDetail, ListingStatus, ListingView,
    PhotoMeta,
};
use utoipa::OpenApi;

/// OpenAPI document for the public JSON API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::list_listings,
        handlers::get_listing,
        handlers::assistant
    ),
    components(schemas(
        Listing,
        ListingStatus,
        ListingView,
        ListingDetail,
        PhotoMeta,
        AssistantRequest,
        AssistantResponse
    )),
    tags((name = "brando-imoveis", description = "Public catalog and assistant API"))
)]
pub struct ApiDoc;
