use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// 多向量嵌入，每个 token 对应一个向量
///
/// 只由嵌入服务产生，只被 [`Pooling::reduce`] 消费
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiVectorEmbedding(pub Vec<Vec<f32>>);

impl MultiVectorEmbedding {
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        Self(vectors)
    }

    /// token 数量
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 检查嵌入是否非空、维度一致且不包含 NaN 和无穷值，返回维度
    fn validate(&self) -> Result<usize> {
        if self.is_empty() {
            return Err(Error::InvalidEmbedding("向量序列为空".to_string()));
        }
        let dim = self.0[0].len();
        if dim == 0 {
            return Err(Error::InvalidEmbedding("向量维度为 0".to_string()));
        }
        for (i, v) in self.0.iter().enumerate() {
            if v.len() != dim {
                return Err(Error::InvalidEmbedding(format!(
                    "第 {} 个向量维度为 {}，与第一个向量的维度 {} 不一致",
                    i,
                    v.len(),
                    dim
                )));
            }
            if let Some(j) = v.iter().position(|x| !x.is_finite()) {
                return Err(Error::InvalidEmbedding(format!("第 {} 个向量的第 {} 维不是有限值", i, j)));
            }
        }
        Ok(dim)
    }
}

impl From<Vec<Vec<f32>>> for MultiVectorEmbedding {
    fn from(vectors: Vec<Vec<f32>>) -> Self {
        Self(vectors)
    }
}

/// 将多向量嵌入折叠为单个向量的规则
///
/// 入库和查询必须使用同一个规则，否则相似度没有意义。
/// 集合会记录建立时使用的规则，写入和查询时都会校验。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    /// 逐维度取最大值
    #[default]
    Max,
}

impl Pooling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
        }
    }

    /// 将多向量嵌入折叠为一个向量
    ///
    /// 只有一个向量时原样返回。包含 NaN 或无穷值的输入一律返回
    /// [`Error::InvalidEmbedding`]，只有一个向量时也不例外
    pub fn reduce(&self, embedding: &MultiVectorEmbedding) -> Result<PooledVector> {
        let dim = embedding.validate()?;
        let data = match self {
            Self::Max => max_pool(&embedding.0, dim),
        };
        Ok(PooledVector { pooling: *self, data })
    }
}

impl fmt::Display for Pooling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pooling {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max" => Ok(Self::Max),
            _ => Err(Error::Config(format!("未知的池化方式: {}", s))),
        }
    }
}

fn max_pool(vectors: &[Vec<f32>], dim: usize) -> Vec<f32> {
    if let [single] = vectors {
        return single.clone();
    }
    let mut out = vec![f32::NEG_INFINITY; dim];
    for v in vectors {
        for (o, &x) in out.iter_mut().zip(v) {
            // total_cmp 下 -0.0 < 0.0，结果与行的顺序无关
            if x.total_cmp(o).is_gt() {
                *o = x;
            }
        }
    }
    out
}

/// 池化后的定长向量，唯一会被存储和比较的表示
#[derive(Debug, Clone, PartialEq)]
pub struct PooledVector {
    pooling: Pooling,
    data: Vec<f32>,
}

impl PooledVector {
    pub fn pooling(&self) -> Pooling {
        self.pooling
    }

    pub fn dim(&self) -> usize {
        self.data.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// 平方欧氏距离
    pub fn l2_squared(&self, other: &[f32]) -> f32 {
        self.data.iter().zip(other).map(|(a, b)| (a - b) * (a - b)).sum()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn embedding(rows: &[&[f32]]) -> MultiVectorEmbedding {
        MultiVectorEmbedding::new(rows.iter().map(|r| r.to_vec()).collect())
    }

    #[test]
    fn max_pool_per_dimension() {
        let e = embedding(&[&[1.0, -2.0, 0.5], &[0.0, 3.0, -1.0], &[-4.0, 1.0, 0.25]]);
        let p = Pooling::Max.reduce(&e).unwrap();
        assert_eq!(p.as_slice(), &[1.0, 3.0, 0.5]);
        assert_eq!(p.pooling(), Pooling::Max);
    }

    #[test]
    fn all_negative_values() {
        let e = embedding(&[&[-1.0, -5.0], &[-3.0, -2.0]]);
        let p = Pooling::Max.reduce(&e).unwrap();
        assert_eq!(p.as_slice(), &[-1.0, -2.0]);
    }

    #[test]
    fn signed_zero_does_not_depend_on_order() {
        let a = Pooling::Max.reduce(&embedding(&[&[-0.0, 0.0], &[0.0, -0.0]])).unwrap();
        let b = Pooling::Max.reduce(&embedding(&[&[0.0, -0.0], &[-0.0, 0.0]])).unwrap();
        let bits = |p: &PooledVector| p.as_slice().iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
        assert_eq!(bits(&a), [0.0f32.to_bits(); 2]);
    }

    #[test]
    fn empty_sequence_is_invalid() {
        let e = MultiVectorEmbedding::new(vec![]);
        assert!(matches!(Pooling::Max.reduce(&e), Err(Error::InvalidEmbedding(_))));
    }

    #[test]
    fn zero_dimension_is_invalid() {
        let e = MultiVectorEmbedding::new(vec![vec![], vec![]]);
        assert!(matches!(Pooling::Max.reduce(&e), Err(Error::InvalidEmbedding(_))));
    }

    #[test]
    fn ragged_sequence_is_invalid() {
        let e = embedding(&[&[1.0, 2.0], &[1.0]]);
        assert!(matches!(Pooling::Max.reduce(&e), Err(Error::InvalidEmbedding(_))));
    }

    #[test]
    fn nan_is_invalid() {
        let e = embedding(&[&[1.0, f32::NAN], &[1.0, 2.0]]);
        assert!(matches!(Pooling::Max.reduce(&e), Err(Error::InvalidEmbedding(_))));
        let e = embedding(&[&[f32::INFINITY]]);
        assert!(matches!(Pooling::Max.reduce(&e), Err(Error::InvalidEmbedding(_))));
    }

    #[test]
    fn pooling_name_round_trip() {
        assert_eq!("max".parse::<Pooling>().unwrap(), Pooling::Max);
        assert!("mean".parse::<Pooling>().is_err());
    }

    fn rows() -> impl Strategy<Value = Vec<Vec<f32>>> {
        (1usize..16, 1usize..32).prop_flat_map(|(n, d)| {
            prop::collection::vec(prop::collection::vec(-1e6f32..1e6f32, d), n)
        })
    }

    proptest! {
        #[test]
        fn pooled_component_is_column_max(rows in rows()) {
            let p = Pooling::Max.reduce(&MultiVectorEmbedding::new(rows.clone())).unwrap();
            prop_assert_eq!(p.dim(), rows[0].len());
            for (j, &x) in p.as_slice().iter().enumerate() {
                let expected = rows.iter().map(|r| r[j]).fold(f32::NEG_INFINITY, f32::max);
                prop_assert_eq!(x, expected);
            }
        }

        #[test]
        fn singleton_is_unchanged(v in prop::collection::vec(-1e6f32..1e6f32, 1..64)) {
            let p = Pooling::Max.reduce(&MultiVectorEmbedding::new(vec![v.clone()])).unwrap();
            prop_assert_eq!(p.into_vec(), v);
        }

        #[test]
        fn row_order_does_not_matter(mut rows in rows()) {
            let a = Pooling::Max.reduce(&MultiVectorEmbedding::new(rows.clone())).unwrap();
            rows.reverse();
            let b = Pooling::Max.reduce(&MultiVectorEmbedding::new(rows)).unwrap();
            let bits =
                |p: PooledVector| p.into_vec().into_iter().map(f32::to_bits).collect::<Vec<_>>();
            prop_assert_eq!(bits(a), bits(b));
        }
    }
}
