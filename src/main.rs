fn main() -> anyhow::Result<()> {
    tagspace_lib::run()
}
