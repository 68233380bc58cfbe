use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;

use api::handlers::AppState;
use blockchain::{chain::DEFAULT_DIFFICULTY, Address, Ledger, Wallet};

/// Reads an environment variable, falling back to a default
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// Log a throwaway wallet at startup so sell transactions can be signed
// against a known keypair during manual testing
fn announce_demo_wallet() {
    let wallet = Wallet::new();
    info!("Demo wallet address: {}", wallet.address());
    info!(
        "Demo wallet private key: {}",
        hex::encode(wallet.export_secret_key())
    );
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_chain,
        api::handlers::get_mempool,
        api::handlers::new_transaction,
        api::handlers::mine_block,
        api::handlers::get_portfolio,
        api::handlers::validate_chain,
        api::handlers::create_wallet
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::Utxo,
            blockchain::Portfolio,
            blockchain::crypto::Address,
            blockchain::crypto::DigitalSignature,
            api::handlers::ChainResponse,
            api::handlers::TransactionRequest,
            api::handlers::TransactionResponse,
            api::handlers::MineResponse,
            api::handlers::WalletResponse
        )
    ),
    tags(
        (name = "ledger", description = "Stock portfolio ledger API endpoints")
    ),
    info(
        title = "Stock Ledger API",
        version = "1.0.0",
        description = "A UTXO-based stock portfolio ledger with proof-of-work blocks",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let bind_addr = env_or("BIND_ADDR", "127.0.0.1");
    let bind_port: u16 = env_or("BIND_PORT", "8080").parse().unwrap_or(8080);
    let broker = Address(env_or("BROKER_ADDRESS", "broker-producer-address"));
    let difficulty: usize = env_or("DIFFICULTY", &DEFAULT_DIFFICULTY.to_string())
        .parse()
        .unwrap_or(DEFAULT_DIFFICULTY);

    info!(
        "Creating in-memory ledger at difficulty {} with producer {}",
        difficulty, broker
    );
    let state = web::Data::new(AppState {
        ledger: Ledger::new(difficulty),
        broker,
    });

    announce_demo_wallet();

    info!("Starting HTTP server at http://{}:{}", bind_addr, bind_port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(state.clone())
            // API routes
            .configure(api::configure_routes)
            // Swagger UI
            .service(SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi))
    })
    .bind((bind_addr, bind_port))?
    .run()
    .await
}
