fn main() -> anyhow::Result<()> {
    recovery_bin::run()
}
