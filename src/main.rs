use rebound::cli::{print_error, Cli};

#[tokio::main]
async fn main() {
    match Cli::run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}
