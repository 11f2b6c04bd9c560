fn main() -> anyhow::Result<()> {
    nmtether_cli::run()
}
