fn main() {
    if let Err(err) = docucam_lib::run() {
        eprintln!("docucam: {err:#}");
        std::process::exit(1);
    }
}
