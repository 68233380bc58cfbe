use actix_web::web;

use super::handlers;

/// The explicit route registration table, built once at startup
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/chain", web::get().to(handlers::get_chain))
            .route("/mempool", web::get().to(handlers::get_mempool))
            .route("/transactions/new", web::post().to(handlers::new_transaction))
            .route("/mine/{asset}", web::post().to(handlers::mine_block))
            .route(
                "/portfolio/{address}/{asset}",
                web::get().to(handlers::get_portfolio),
            )
            .route("/validate", web::get().to(handlers::validate_chain))
            .route("/wallet/new", web::post().to(handlers::create_wallet)),
    );
}
