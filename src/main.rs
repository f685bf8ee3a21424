fn main() {
    if let Err(err) = probecast_lib::run() {
        log::error!("{err:?}");
        std::process::exit(1);
    }
}
