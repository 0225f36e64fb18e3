fn main() {
    dss_apply::cli::main();
}
