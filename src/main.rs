fn main() -> anyhow::Result<()> {
    focuswatch_lib::run()
}
