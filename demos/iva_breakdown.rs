use arca_fe::core::*;
use rust_decimal_macros::dec;

fn main() {
    // ── A mixed basket ────────────────────────────────────────────────
    let lines = vec![
        LineItemBuilder::new("YERBA-1KG", dec!(2), dec!(2450.00))
            .description("Yerba mate 1 kg")
            .iva(dec!(21))
            .build(),
        LineItemBuilder::new("PAN-LACT", dec!(3), dec!(1180.50))
            .description("Pan lactal")
            .iva(dec!(10.5))
            .build(),
        LineItemBuilder::new("LIBRO-01", dec!(1), dec!(9800.00))
            .description("Libro")
            .iva(dec!(0))
            .build(),
        LineItemBuilder::new("GAS-1", dec!(1), dec!(15000.00))
            .description("Servicio de gas")
            .iva(dec!(27))
            .build(),
    ];

    let summary = match summarize_lines(&lines) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot summarize: {e}");
            return;
        }
    };

    println!("=== IVA buckets ===");
    for b in &summary.buckets {
        println!(
            "  {:>5}% (code {}): base {:>10}  tax {:>9}",
            b.rate, b.code.0, b.base, b.tax
        );
    }
    println!("  net {}  vat {}  total {}", summary.net, summary.vat, summary.total);

    println!("\n=== AlicIva entries sent to WSFEv1 ===");
    for a in summary.alicuotas() {
        println!("  Id {}  BaseImp {}  Importe {}", a.code.0, a.base, a.amount);
    }

    // ── A rate without an authority code ──────────────────────────────
    println!("\n=== Unmapped rate ===");
    let odd = summarize_lines(&[LineItemBuilder::new("X", dec!(1), dec!(100))
        .iva(dec!(7))
        .build()]);
    if let Ok(odd) = odd {
        for w in &odd.warnings {
            println!("  {}% reported as code {}", w.rate, w.reported_as.0);
        }
    }

    // ── Buyer documents ───────────────────────────────────────────────
    println!("\n=== Buyer documents ===");
    for (kind, number) in [("CUIT", "20-12345678-6"), ("DNI", "30111222"), ("DNI", "123")] {
        let doc = classify_buyer_document(kind, number);
        println!(
            "  {kind} {number:<14} -> DocTipo {} DocNro {}",
            doc.doc_type.code(),
            doc.number
        );
    }
}
