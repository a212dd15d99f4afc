fn main() {
    if handle_cli_flags() {
        return;
    }

    let options = match food_feed::app::RunOptions::from_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = food_feed::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("food-feed {}", food_feed::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "food-feed - Browse the Open Food Facts catalog from the terminal.\n\n  --version, -V          Show version and exit\n  --help,    -h          Show this help message\n  --config <path>        Read configuration from <path>\n  --page-size <n>        Products fetched per page (default 50)\n  --sort <key>           product-name-asc, product-name-desc,\n                         nutrition-grade-asc (default), nutrition-grade-desc\n  --demo                 Browse built-in sample data instead of the network"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
