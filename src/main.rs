fn main() {
    cone_detect::cli::run();
}
