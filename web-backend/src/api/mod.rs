use actix_web::{web, Scope};

pub mod scan;

pub fn create_api_router() -> Scope {
    web::scope("/api").service(scan_routes())
}

fn scan_routes() -> Scope {
    web::scope("/scan").configure(scan::configure_scan_routes)
}
