use crate::model::Product;

fn product(id: &str, name: &str, price: f64, category: &str, features: &[&str]) -> Product {
    Product {
        id: id.to_string(),
        name: name.to_string(),
        price,
        category: category.to_string(),
        features: features.iter().map(|f| f.to_string()).collect(),
    }
}

/// The built-in catalog served at `/api/products` and used when a request
/// does not carry its own product list.
pub fn default_catalog() -> Vec<Product> {
    vec![
        product(
            "p1",
            "Pixel 8a",
            499.0,
            "phone",
            &["120hz display", "ai camera", "7 years of updates"],
        ),
        product(
            "p2",
            "Galaxy A54",
            449.0,
            "phone",
            &["amoled display", "5000mah battery", "ip67"],
        ),
        product(
            "p3",
            "iPhone 15",
            699.0,
            "phone",
            &["a16 bionic", "dynamic island", "usb-c"],
        ),
        product(
            "p4",
            "OnePlus 12R",
            549.0,
            "phone",
            &["snapdragon 8 gen 2", "100w charging", "5500mah battery"],
        ),
        product(
            "p5",
            "Moto G Power",
            299.0,
            "phone",
            &["all-day battery", "stylus-free design", "fast charging"],
        ),
        product(
            "p6",
            "Sony WH-1000XM5",
            399.0,
            "headphones",
            &["noise cancelling", "30-hour battery"],
        ),
    ]
}
