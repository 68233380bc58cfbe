use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{
    Address, Block, DigitalSignature, Ledger, LedgerError, Portfolio, Transaction, Wallet,
};

/// Shared state handed to every handler: the ledger and the broker
/// identity that produces blocks
pub struct AppState {
    pub ledger: Ledger,
    pub broker: Address,
}

pub type LedgerData = web::Data<AppState>;

/// Response for the chain endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The number of blocks in the chain
    pub length: usize,

    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// Whether the chain passes validation
    pub is_valid: bool,
}

/// Request for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionRequest {
    /// Seller address; omit for a buy/issuance
    pub from: Option<String>,

    /// Receiving address
    pub to: String,

    /// Number of shares
    pub amount: f64,

    /// Asset ticker (e.g. AAPL)
    pub asset: String,

    /// Price per share
    pub price: f64,

    /// Base58 signature over the content hash; required when `from` is set
    pub signature: Option<String>,
}

/// Response for the transaction endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    /// The message
    pub message: String,

    /// The accepted transaction, with assigned inputs and outputs
    pub transaction: Transaction,
}

/// Response for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// Hash of the newly sealed block
    pub block_hash: String,

    /// Address of the block producer
    pub producer: String,

    /// Number of transactions included in the block
    pub transactions_processed: usize,
}

/// Response for the create wallet endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletResponse {
    /// The wallet's address (base58 public key)
    pub address: String,

    /// The wallet's secret key (hex encoded); store it yourself
    pub private_key: String,
}

/// Maps a ledger rejection to an HTTP error response
fn rejection(err: LedgerError) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });

    match err {
        LedgerError::UnsupportedTransfer => HttpResponse::UnprocessableEntity().json(body),
        _ => HttpResponse::BadRequest().json(body),
    }
}

/// Get the full chain
///
/// Returns every block plus the chain's validity status
#[utoipa::path(
    get,
    path = "/api/v1/chain",
    responses(
        (status = 200, description = "Chain retrieved successfully", body = ChainResponse)
    )
)]
pub async fn get_chain(state: LedgerData) -> impl Responder {
    let chain = state.ledger.chain();
    let is_valid = state.ledger.is_valid();

    HttpResponse::Ok().json(ChainResponse {
        length: chain.len(),
        chain,
        is_valid,
    })
}

/// Get the mempool
///
/// Returns all transactions waiting to be included in a block
#[utoipa::path(
    get,
    path = "/api/v1/mempool",
    responses(
        (status = 200, description = "Pending transactions retrieved successfully", body = Vec<Transaction>)
    )
)]
pub async fn get_mempool(state: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.mempool())
}

/// Submit a transaction
///
/// Validates the intent and, if accepted, assigns its inputs/outputs and
/// places it in the mempool
#[utoipa::path(
    post,
    path = "/api/v1/transactions/new",
    request_body = TransactionRequest,
    responses(
        (status = 201, description = "Transaction admitted to the mempool", body = TransactionResponse),
        (status = 400, description = "Invalid transaction"),
        (status = 422, description = "Transfers between distinct addresses are unsupported")
    )
)]
pub async fn new_transaction(
    state: LedgerData,
    request: web::Json<TransactionRequest>,
) -> impl Responder {
    let request = request.into_inner();

    let from = request
        .from
        .filter(|address| !address.is_empty())
        .map(Address);

    let mut transaction = Transaction::new(
        from,
        Address(request.to),
        request.amount,
        request.asset,
        request.price,
    );
    if let Some(signature) = request.signature {
        transaction.attach_signature(DigitalSignature(signature));
    }

    match state.ledger.submit_transaction(transaction) {
        Ok(accepted) => HttpResponse::Created().json(TransactionResponse {
            message: "Transaction added to mempool successfully.".to_string(),
            transaction: accepted,
        }),
        Err(err) => rejection(err),
    }
}

/// Mine a block
///
/// Drains the mempool into a new proof-of-work-sealed block for the given
/// asset's market
#[utoipa::path(
    post,
    path = "/api/v1/mine/{asset}",
    params(
        ("asset" = String, Path, description = "Asset ticker to produce a block for")
    ),
    responses(
        (status = 200, description = "Block mined successfully", body = MineResponse),
        (status = 400, description = "Empty mempool or uninitialized asset")
    )
)]
pub async fn mine_block(state: LedgerData, asset: web::Path<String>) -> impl Responder {
    let ticker = asset.into_inner().to_uppercase();

    match state.ledger.mine(&state.broker, &ticker) {
        Ok(block) => HttpResponse::Ok().json(MineResponse {
            message: format!("Block for {} successfully processed!", ticker),
            block_hash: block.hash,
            producer: state.broker.0.clone(),
            transactions_processed: block.transactions.len(),
        }),
        Err(err) => rejection(err),
    }
}

/// Get a portfolio
///
/// Returns the quantity, weighted-average cost and total cost an address
/// holds in an asset; unknown pairs yield zeros
#[utoipa::path(
    get,
    path = "/api/v1/portfolio/{address}/{asset}",
    params(
        ("address" = String, Path, description = "Owner address"),
        ("asset" = String, Path, description = "Asset ticker")
    ),
    responses(
        (status = 200, description = "Portfolio retrieved successfully", body = Portfolio)
    )
)]
pub async fn get_portfolio(
    state: LedgerData,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (address, asset) = path.into_inner();
    let portfolio = state.ledger.portfolio(&Address(address), &asset);

    HttpResponse::Ok().json(portfolio)
}

/// Validate the chain
///
/// Recomputes chain integrity from scratch
#[utoipa::path(
    get,
    path = "/api/v1/validate",
    responses(
        (status = 200, description = "Chain validity", body = bool)
    )
)]
pub async fn validate_chain(state: LedgerData) -> impl Responder {
    HttpResponse::Ok().json(state.ledger.is_valid())
}

/// Create a wallet
///
/// Generates a fresh keypair; the secret key is returned once and never
/// stored server-side
#[utoipa::path(
    post,
    path = "/api/v1/wallet/new",
    responses(
        (status = 201, description = "Wallet created successfully", body = WalletResponse)
    )
)]
pub async fn create_wallet() -> impl Responder {
    let wallet = Wallet::new();

    HttpResponse::Created().json(WalletResponse {
        address: wallet.address().0.clone(),
        private_key: hex::encode(wallet.export_secret_key()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::configure_routes;
    use actix_web::{test, App};

    fn state() -> web::Data<AppState> {
        web::Data::new(AppState {
            ledger: Ledger::new(1),
            broker: Address("broker-producer-address".to_string()),
        })
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(
                App::new()
                    .app_data($state.clone())
                    .configure(configure_routes),
            )
            .await
        };
    }

    fn buy_request(to: &Address, amount: f64, price: f64) -> TransactionRequest {
        TransactionRequest {
            from: None,
            to: to.0.clone(),
            amount,
            asset: "AAPL".to_string(),
            price,
            signature: None,
        }
    }

    fn sale_request(wallet: &Wallet, amount: f64, price: f64) -> TransactionRequest {
        let mut tx = Transaction::new(
            Some(wallet.address().clone()),
            wallet.address().clone(),
            amount,
            "AAPL",
            price,
        );
        tx.sign(wallet).unwrap();

        TransactionRequest {
            from: Some(wallet.address().0.clone()),
            to: wallet.address().0.clone(),
            amount,
            asset: "AAPL".to_string(),
            price,
            signature: tx.signature.map(|s| s.0),
        }
    }

    #[actix_web::test]
    async fn test_chain_starts_at_genesis() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/v1/chain").to_request();
        let response: ChainResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(response.length, 1);
        assert!(response.is_valid);
    }

    #[actix_web::test]
    async fn test_buy_mine_portfolio_flow() {
        let state = state();
        let app = app!(state);
        let wallet = Wallet::new();

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(buy_request(wallet.address(), 5.0, 100.0))
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 201);

        let req = test::TestRequest::post()
            .uri("/api/v1/mine/aapl")
            .to_request();
        let mined: MineResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(mined.transactions_processed, 1);
        assert_eq!(mined.producer, "broker-producer-address");

        let uri = format!("/api/v1/portfolio/{}/AAPL", wallet.address());
        let req = test::TestRequest::get().uri(&uri).to_request();
        let portfolio: Portfolio = test::call_and_read_body_json(&app, req).await;
        assert_eq!(portfolio.quantity, 5.0);
        assert_eq!(portfolio.average_cost, 100.0);
    }

    #[actix_web::test]
    async fn test_sale_preserves_average_over_http() {
        let state = state();
        let app = app!(state);
        let wallet = Wallet::new();

        for price in [100.0, 200.0] {
            let req = test::TestRequest::post()
                .uri("/api/v1/transactions/new")
                .set_json(buy_request(wallet.address(), 5.0, price))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), 201);
        }

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(sale_request(&wallet, 5.0, 175.0))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);

        let uri = format!("/api/v1/portfolio/{}/AAPL", wallet.address());
        let req = test::TestRequest::get().uri(&uri).to_request();
        let portfolio: Portfolio = test::call_and_read_body_json(&app, req).await;
        assert_eq!(portfolio.quantity, 5.0);
        assert_eq!(portfolio.average_cost, 150.0);
        assert_eq!(portfolio.total_cost, 750.0);
    }

    #[actix_web::test]
    async fn test_transfer_maps_to_422() {
        let state = state();
        let app = app!(state);
        let seller = Wallet::new();
        let other = Wallet::new();

        let mut tx = Transaction::new(
            Some(seller.address().clone()),
            other.address().clone(),
            1.0,
            "AAPL",
            100.0,
        );
        tx.sign(&seller).unwrap();

        let request = TransactionRequest {
            from: Some(seller.address().0.clone()),
            to: other.address().0.clone(),
            amount: 1.0,
            asset: "AAPL".to_string(),
            price: 100.0,
            signature: tx.signature.map(|s| s.0),
        };

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(request)
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 422);
    }

    #[actix_web::test]
    async fn test_mine_empty_mempool_rejected() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/mine/AAPL")
            .to_request();
        let response = test::call_service(&app, req).await;
        assert_eq!(response.status(), 400);
    }

    #[actix_web::test]
    async fn test_unknown_portfolio_is_zero() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::get()
            .uri("/api/v1/portfolio/nobody/MSFT")
            .to_request();
        let portfolio: Portfolio = test::call_and_read_body_json(&app, req).await;
        assert_eq!(portfolio.quantity, 0.0);
        assert_eq!(portfolio.average_cost, 0.0);
        assert_eq!(portfolio.total_cost, 0.0);
    }

    #[actix_web::test]
    async fn test_create_wallet_signs_valid_sales() {
        let state = state();
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/v1/wallet/new")
            .to_request();
        let created: WalletResponse = test::call_and_read_body_json(&app, req).await;

        let secret = hex::decode(created.private_key).unwrap();
        let wallet = Wallet::from_secret_key(&secret).unwrap();
        assert_eq!(wallet.address().0, created.address);

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(buy_request(wallet.address(), 2.0, 50.0))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);

        let req = test::TestRequest::post()
            .uri("/api/v1/transactions/new")
            .set_json(sale_request(&wallet, 2.0, 60.0))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }
}
