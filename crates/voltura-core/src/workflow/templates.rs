//! Customer-facing message texts (Malay, as sent to customers).

use rust_decimal::Decimal;
use voltura_types::reminder::Cadence;

pub fn acknowledgement(name: &str) -> String {
    format!(
        "Hai {name}, terima kasih kerana menghubungi Voltura Service Hub. Pasukan kami sedang semak mesej anda."
    )
}

pub fn quotation_summary(number: &str, total: Decimal) -> String {
    format!(
        "Sebutharga #{number}\nJumlah: RM{}\nBalas SETUJU untuk teruskan atau TAK SETUJU untuk batalkan.",
        money(total)
    )
}

pub fn reminder(name: Option<&str>, ticket: &str, cadence: Cadence) -> String {
    let name = name.filter(|n| !n.trim().is_empty()).unwrap_or("pelanggan");
    match cadence {
        Cadence::Day1 => format!("Hai {name}, ini peringatan mengenai tiket {ticket}."),
        Cadence::Day20 => format!(
            "Hai {name}, ini peringatan mengenai tiket {ticket}. Peranti anda masih menunggu tindakan anda."
        ),
        Cadence::Day30 => format!(
            "Hai {name}, ini peringatan terakhir mengenai tiket {ticket}. Sila hubungi kami secepat mungkin."
        ),
    }
}

pub fn quotation_accepted(number: &str) -> String {
    format!("Sebutharga {number} diterima. Invoice anda sedang disediakan.")
}

pub fn quotation_rejected(number: &str) -> String {
    format!("Sebutharga {number} telah dibatalkan. Hubungi kami jika perlukan bantuan lain.")
}

pub fn pos_receipt(number: &str, total: Decimal) -> String {
    format!("Terima kasih! Resit POS {number} berjumlah RM{}.", money(total))
}

/// Two decimal places, e.g. `281.00`.
fn money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
