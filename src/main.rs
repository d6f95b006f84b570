fn main() {
    if let Err(e) = grace::app::run() {
        eprintln!("{:#}", e); // pretty anyhow chain
        std::process::exit(1);
    }
}
