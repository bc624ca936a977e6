use core::panic::PanicInfo;

use defmt::error;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    if let Some(location) = info.location() {
        error!(
            "PANIC at {}:{}: {}",
            location.file(),
            location.line(),
            defmt::Display2Format(&info.message())
        );
    } else {
        error!("PANIC: {}", defmt::Display2Format(&info.message()));
    }
    cortex_m::asm::udf();
}
